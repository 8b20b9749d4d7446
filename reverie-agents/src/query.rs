//! Determine phase: the text an agent retrieves memories with.

use reverie_core::dialogue::DialogueTurn;
use reverie_core::persona::AgentProfile;

use crate::perception::NONE_MARKER;

/// Last line of every retrieval query.
pub const RETRIEVAL_TASK: &str = "task=retrieve memories needed to judge the current situation";

/// Build a `key=value` retrieval query from the agent's persona, the new
/// observation and the recent dialogue.
#[must_use]
pub fn retrieval_query(
    profile: &AgentProfile,
    observation: &str,
    dialogue: &[DialogueTurn],
) -> String {
    let identity = profile.identity();
    let mut lines = vec![
        format!("agent={}", identity.name),
        format!("traits={}", identity.traits.join(", ")),
    ];
    if !profile.fixed.identity_stable_set.is_empty() {
        lines.push(format!(
            "identity_stable_set={}",
            first_two(&profile.fixed.identity_stable_set)
        ));
    }
    if !profile.extended.current_plan_context.is_empty() {
        lines.push(format!(
            "current_plan_context={}",
            first_two(&profile.extended.current_plan_context)
        ));
    }
    lines.push(format!("observation={observation}"));

    if !dialogue.is_empty() {
        lines.push("recent_dialogue_context=".to_string());
        for (i, turn) in dialogue.iter().enumerate() {
            let n = i + 1;
            lines.push(format!("turn_{n}_partner={}", or_none(&turn.partner)));
            lines.push(format!("turn_{n}_self={}", or_none(&turn.own)));
        }
    }
    lines.push(RETRIEVAL_TASK.to_string());
    lines.join("\n")
}

fn first_two(entries: &[String]) -> String {
    entries.iter().take(2).map(String::as_str).collect::<Vec<_>>().join(" | ")
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { NONE_MARKER } else { text }
}
