//! Prompt templates for every LLM-backed collaborator.
//!
//! Templates are plain `&str` constants with `{placeholder}` slots filled
//! by [`render_template`]. JSON shapes inside the templates use literal
//! braces; only known keys are substituted.

use std::fmt::Write as _;

use reverie_core::config::Language;
use reverie_core::importance::ObservationContext;
use reverie_core::memory::MemoryRecord;
use reverie_core::persona::AgentProfile;
use reverie_core::reaction::{ReactionRequest, RepetitionGuard};

/// Memories shown in the reaction prompt's memory summary.
pub const REACTION_MEMORY_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Importance scoring prompt.
pub const IMPORTANCE_PROMPT: &str = r#"Score memory importance for an autonomous agent from 1 to 10.
Scale: 1-3 trivial routine, 4-6 somewhat meaningful, 7-8 important for goals/relationships, 9-10 critical.
Return JSON only with this shape: {"importance": <int 1-10>, "reason": "<short>"}.

Agent: {agent_name}
Identity stable set: {identity}
Current plan: {plan}
Observation: {observation}
"#;

/// Reflection question prompt. Follows the numbered statements block.
pub const QUESTIONS_INSTRUCTION: &str = r#"Given only the information above, what are {count} most salient high-level questions we can answer about the subjects in the statements?
Return JSON only with this shape: {"questions": ["<question 1>", ...]}"#;

/// Reflection insight prompt. Follows the numbered statements block.
pub const INSIGHTS_INSTRUCTION: &str = r#"What {count} high-level insights can you infer from the above statements? Use statement numbers as evidence references.
Return JSON only with this shape: {"insights": [{"insight": "<text>", "citation_statement_numbers": [1, 5, 3]}, {"insight": "<text>", "citation_statement_numbers": [2, 4]}]}"#;

/// The JSON shape every reaction answer must follow.
pub const REACTION_JSON_SHAPE: &str = r#"Return JSON only with this shape: {"should_react": <boolean>, "thought": "<string>", "critique": "<string>", "utterance": "<string>", "reason": "<short string>"}"#;

/// Closing instructions of the reaction prompt.
pub const REACTION_INSTRUCTIONS: &str = "If you provide a reaction, it must be spoken dialogue addressed to the conversation partner, not inner monologue.
Do not narrate personal schedules or plans unless saying them directly to the partner in natural conversation.
When there is no prior dialogue context, use a brief greeting only when social context requires it. Avoid repetitive greeting phrases across turns.
Should [{agent_name}] react to the observation, and if so, what would be an appropriate reaction?";

/// System prompt pinning reactions to English.
pub const SYSTEM_ENGLISH: &str = "You are simulating a conversational human agent. All generated natural-language reaction text must be in English only.";

/// System prompt pinning reactions to Korean.
pub const SYSTEM_KOREAN: &str = "You are simulating a conversational human agent. All generated natural-language reaction text must be in Korean only.";

/// Render a template by replacing `{key}` with the matching value.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// System prompt for the requested output language.
#[must_use]
pub fn language_system_prompt(language: Language) -> &'static str {
    match language {
        Language::English => SYSTEM_ENGLISH,
        Language::Korean => SYSTEM_KOREAN,
    }
}

/// Importance prompt for one observation.
#[must_use]
pub fn importance_prompt(observation: &str, context: &ObservationContext) -> String {
    let identity = join_or(&context.identity_facts, 3, " | ", "N/A");
    let plan = context
        .current_plan
        .first()
        .map_or("N/A", String::as_str);
    render_template(
        IMPORTANCE_PROMPT,
        &[
            ("agent_name", context.agent_name.as_str()),
            ("identity", identity.as_str()),
            ("plan", plan),
            ("observation", observation),
        ],
    )
}

/// Numbered statements: `Statements about {agent}` then `1. ...`, `2. ...`.
///
/// Statement `n` is `memories[n - 1]`.
#[must_use]
pub fn statements_block(agent_name: &str, memories: &[&MemoryRecord]) -> String {
    let mut out = format!("Statements about {agent_name}\n");
    for (i, memory) in memories.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, memory.content);
    }
    out
}

/// Reflection question prompt.
#[must_use]
pub fn questions_prompt(agent_name: &str, memories: &[&MemoryRecord], count: usize) -> String {
    let count = count.to_string();
    format!(
        "{}\n{}",
        statements_block(agent_name, memories),
        render_template(QUESTIONS_INSTRUCTION, &[("count", count.as_str())])
    )
}

/// Reflection insight prompt.
#[must_use]
pub fn insights_prompt(agent_name: &str, memories: &[&MemoryRecord], count: usize) -> String {
    let count = count.to_string();
    format!(
        "{}\n{}",
        statements_block(agent_name, memories),
        render_template(INSIGHTS_INSTRUCTION, &[("count", count.as_str())])
    )
}

/// Persona summary: name, age, traits and the non-empty persona sections.
#[must_use]
pub fn summary_description(profile: &AgentProfile) -> String {
    let identity = profile.identity();
    let mut lines = vec![
        format!("Name: {}", identity.name),
        format!("Age: {}", identity.age),
        format!("Traits: {}", identity.traits.join(", ")),
    ];
    let sections = [
        ("Identity stable set", &profile.fixed.identity_stable_set, 3),
        ("Lifestyle and routine", &profile.extended.lifestyle_and_routine, 2),
        ("Current plan context", &profile.extended.current_plan_context, 2),
    ];
    for (label, entries, limit) in sections {
        if !entries.is_empty() {
            lines.push(format!("{label}: {}", join_or(entries, limit, " | ", "")));
        }
    }
    lines.join("\n")
}

/// `[name]'s status: ...` from the top of the plan stack.
#[must_use]
pub fn agent_status(profile: &AgentProfile) -> String {
    let status = profile.extended.current_plan().unwrap_or("Idle");
    format!("[{}]'s status: {status}.", profile.name())
}

/// Bullet list of the best retrieved memories.
#[must_use]
pub fn memory_summary(memories: &[MemoryRecord]) -> String {
    if memories.is_empty() {
        return "- no relevant memory found".to_string();
    }
    memories
        .iter()
        .take(REACTION_MEMORY_LIMIT)
        .enumerate()
        .map(|(i, m)| format!("- ({}) [importance={}] {}", i + 1, m.importance, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full reaction prompt. Appends the overlap guard when the request carries
/// one.
#[must_use]
pub fn reaction_prompt(request: &ReactionRequest) -> String {
    let profile = &request.profile;
    let name = profile.name();
    let mut sections = vec![
        "[Agent's Summary Description]".to_string(),
        summary_description(profile),
        format!("It is {}.", request.current_time.to_rfc3339()),
        agent_status(profile),
        format!("Observation: {}", request.observation),
    ];
    if !request.dialogue_history.is_empty() {
        sections.push("Recent dialogue context:".to_string());
        for (i, turn) in request.dialogue_history.iter().enumerate() {
            let n = i + 1;
            sections.push(format!("- turn {n} partner: {}", or_none(&turn.partner)));
            sections.push(format!("- turn {n} self: {}", or_none(&turn.own)));
        }
    }
    sections.push(format!("Summary of relevant context from [{name}]'s memory:"));
    sections.push(memory_summary(&request.retrieved_memories));
    sections.push(render_template(REACTION_INSTRUCTIONS, &[("agent_name", name)]));
    sections.push(REACTION_JSON_SHAPE.to_string());

    let base = sections.join("\n");
    match &request.repetition_guard {
        Some(guard) => format!("{base}\n\n{}", overlap_guard_block(guard)),
        None => base,
    }
}

/// Retry block listing the sentences a rejected candidate overlapped with.
#[must_use]
pub fn overlap_guard_block(guard: &RepetitionGuard) -> String {
    let percent = (guard.max_overlap * 100.0).round();
    let mut lines = vec![
        "Your previous reaction was too similar to recent dialogue.".to_string(),
        "Generate a different reaction while preserving intent.".to_string(),
        format!("Constraint: n-gram overlap with each sentence below must be <= {percent}%."),
        format!("Previous candidate: {}", guard.rejected_candidate),
        "Recent dialogue sentences:".to_string(),
    ];
    for (i, sentence) in guard.offending_sentences.iter().enumerate() {
        lines.push(format!("- {}. {sentence}", i + 1));
    }
    lines.push(REACTION_JSON_SHAPE.to_string());
    lines.join("\n")
}

fn join_or(entries: &[String], limit: usize, sep: &str, empty: &str) -> String {
    if entries.is_empty() {
        return empty.to_string();
    }
    entries
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "none" } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_only_known_keys() {
        let out = render_template(r#"{"a": {x}} {y}"#, &[("x", "1")]);
        assert_eq!(out, r#"{"a": 1} {y}"#);
    }

    #[test]
    fn importance_prompt_uses_na_for_missing_grounding() {
        let ctx = ObservationContext::for_agent("Mina");
        let prompt = importance_prompt("A bird sang.", &ctx);
        assert!(prompt.contains("Agent: Mina\n"));
        assert!(prompt.contains("Identity stable set: N/A\n"));
        assert!(prompt.contains("Current plan: N/A\n"));
        assert!(prompt.ends_with("Observation: A bird sang.\n"));
    }

    #[test]
    fn importance_prompt_limits_identity_to_three_facts() {
        let ctx = ObservationContext {
            agent_name: "Mina".into(),
            identity_facts: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            current_plan: vec!["bake".into(), "sleep".into()],
        };
        let prompt = importance_prompt("x", &ctx);
        assert!(prompt.contains("Identity stable set: a | b | c\n"));
        assert!(prompt.contains("Current plan: bake\n"));
    }

    #[test]
    fn empty_memory_summary_says_so() {
        assert_eq!(memory_summary(&[]), "- no relevant memory found");
    }

    #[test]
    fn guard_block_renders_percent() {
        let guard = RepetitionGuard {
            offending_sentences: vec!["Hello there".into()],
            rejected_candidate: "Hello there friend".into(),
            max_overlap: 0.5,
        };
        let block = overlap_guard_block(&guard);
        assert!(block.contains("must be <= 50%."));
        assert!(block.contains("Previous candidate: Hello there friend"));
        assert!(block.contains("- 1. Hello there"));
        assert!(block.ends_with(REACTION_JSON_SHAPE));
    }

    #[test]
    fn language_prompts_differ() {
        assert!(language_system_prompt(Language::Korean).contains("Korean only"));
        assert!(language_system_prompt(Language::English).contains("English only"));
    }
}
