//! Perceive phase: turn what an agent notices into observation text.

use reverie_core::persona::AgentProfile;
use reverie_core::types::Timestamp;

/// Marker for an absent section.
pub const NONE_MARKER: &str = "none";

/// Everything an agent notices in one tick.
#[derive(Debug, Clone, Copy)]
pub struct Percept<'a> {
    /// Simulation time.
    pub now: Timestamp,
    /// Shared scene description.
    pub world_context: Option<&'a str>,
    /// Who or what is around.
    pub observed_entities: &'a [String],
    /// What happened since the last tick, oldest first.
    pub observed_events: &'a [String],
}

/// One-line observation: time, agent, traits, plan, world, entities and
/// events, with [`NONE_MARKER`] standing in for anything missing.
#[must_use]
pub fn observation_text(profile: &AgentProfile, percept: &Percept<'_>) -> String {
    let identity = profile.identity();
    let traits = non_empty(identity.traits.join(", "));
    let plan = profile.extended.current_plan().unwrap_or(NONE_MARKER);
    let world = percept
        .world_context
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .unwrap_or(NONE_MARKER);
    let entities = non_empty(joined(percept.observed_entities, ", "));
    let events = non_empty(joined(percept.observed_events, " | "));

    format!(
        "time: {}; agent: {} ({traits}); plan: {plan}; world: {world}; \
         entities: {entities}; events: {events}",
        percept.now.to_rfc3339(),
        identity.name,
    )
}

fn joined(items: &[String], sep: &str) -> String {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

fn non_empty(text: String) -> String {
    if text.is_empty() {
        NONE_MARKER.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use reverie_core::persona::{AgentIdentity, ExtendedPersona, FixedPersona};

    fn profile(traits: Vec<String>, plans: Vec<String>) -> AgentProfile {
        AgentProfile::new(
            AgentIdentity {
                id: "jun".into(),
                name: "Jun".into(),
                age: 34,
                traits,
            },
            FixedPersona::default(),
            ExtendedPersona {
                lifestyle_and_routine: Vec::new(),
                current_plan_context: plans,
            },
        )
        .expect("profile")
    }

    fn at() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single().expect("time")
    }

    #[test]
    fn missing_sections_become_none() {
        let p = profile(Vec::new(), Vec::new());
        let text = observation_text(
            &p,
            &Percept {
                now: at(),
                world_context: Some("   "),
                observed_entities: &[],
                observed_events: &[" ".to_string()],
            },
        );
        assert_eq!(
            text,
            "time: 2024-05-01T08:00:00+00:00; agent: Jun (none); plan: none; \
             world: none; entities: none; events: none"
        );
    }

    #[test]
    fn filled_sections_are_joined() {
        let p = profile(vec!["calm".into(), "tidy".into()], vec!["Open the shop".into()]);
        let entities = vec!["Mina".to_string()];
        let events = vec!["Mina said: Hi".to_string(), "I said: Hello".to_string()];
        let text = observation_text(
            &p,
            &Percept {
                now: at(),
                world_context: Some("a quiet street"),
                observed_entities: &entities,
                observed_events: &events,
            },
        );
        assert!(text.contains("agent: Jun (calm, tidy)"));
        assert!(text.contains("plan: Open the shop"));
        assert!(text.contains("world: a quiet street"));
        assert!(text.contains("entities: Mina;"));
        assert!(text.ends_with("events: Mina said: Hi | I said: Hello"));
    }
}
