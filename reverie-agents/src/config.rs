//! Simulation configuration: the core config plus the agents to seat.
//!
//! ```toml
//! [reflection]
//! threshold = 40
//!
//! [simulation]
//! turns = 12
//!
//! [[agents]]
//! id = "mina"
//! name = "Mina"
//! traits = ["curious"]
//! identity_stable_set = ["Runs the bakery on Elm Street"]
//!
//! [[agents.seeds]]
//! content = "Jun ordered a cake for Saturday"
//! importance = 5
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use reverie_core::ReverieConfig;
use reverie_core::error::{Result, ReverieError};
use reverie_core::persona::{AgentIdentity, AgentProfile, ExtendedPersona, FixedPersona};
use serde::{Deserialize, Serialize};

/// Everything `reverie-sim` reads from its TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Core settings (`[memory]`, `[retrieval]`, `[llm]`, ...).
    #[serde(flatten)]
    pub reverie: ReverieConfig,
    /// Run length and clock.
    #[serde(default)]
    pub simulation: RunConfig,
    /// Agents in speaking order.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl SimulationConfig {
    /// Parse from a TOML string.
    ///
    /// # Errors
    /// [`ReverieError::Config`] for invalid TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ReverieError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// I/O errors and invalid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

/// Run length and simulated clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of turns to run.
    #[serde(default = "default_turns")]
    pub turns: usize,
    /// Simulated time of the first turn; wall-clock now when unset.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Simulated minutes between turns.
    #[serde(default = "default_turn_minutes")]
    pub turn_minutes: i64,
    /// Recent memories printed per agent at the end.
    #[serde(default = "default_report_limit")]
    pub report_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            turns: default_turns(),
            start_time: None,
            turn_minutes: default_turn_minutes(),
            report_limit: default_report_limit(),
        }
    }
}

/// One agent: identity, persona and seed memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years.
    #[serde(default)]
    pub age: u32,
    /// Innate traits.
    #[serde(default)]
    pub traits: Vec<String>,
    /// Stable identity facts.
    #[serde(default)]
    pub identity_stable_set: Vec<String>,
    /// Daily routine.
    #[serde(default)]
    pub lifestyle_and_routine: Vec<String>,
    /// Plan stack, top first.
    #[serde(default)]
    pub current_plan_context: Vec<String>,
    /// Memories stored before the first turn.
    #[serde(default)]
    pub seeds: Vec<SeedMemory>,
}

impl AgentSpec {
    /// Validate into a profile.
    ///
    /// # Errors
    /// [`ReverieError::InvalidProfile`].
    pub fn to_profile(&self) -> Result<AgentProfile> {
        AgentProfile::new(
            AgentIdentity {
                id: self.id.clone(),
                name: self.name.clone(),
                age: self.age,
                traits: self.traits.clone(),
            },
            FixedPersona {
                identity_stable_set: self.identity_stable_set.clone(),
            },
            ExtendedPersona {
                lifestyle_and_routine: self.lifestyle_and_routine.clone(),
                current_plan_context: self.current_plan_context.clone(),
            },
        )
    }
}

/// A pre-authored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedMemory {
    /// Memory text.
    pub content: String,
    /// Explicit importance; scored like any observation when unset.
    #[serde(default)]
    pub importance: Option<i64>,
}

fn default_turns() -> usize { 20 }
fn default_turn_minutes() -> i64 { 1 }
fn default_report_limit() -> usize { 5 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid() {
        let config = SimulationConfig::from_toml("").expect("parse");
        assert!(config.agents.is_empty());
        assert_eq!(config.simulation.turns, 20);
        assert_eq!(config.reverie.retrieval.top_k, 3);
    }

    #[test]
    fn parses_core_sections_and_agents() {
        let toml = r#"
            [reflection]
            threshold = 40
            rollover = "reset"

            [session]
            dialogue_window = 4

            [simulation]
            turns = 6
            start_time = "2024-02-14T09:00:00Z"

            [[agents]]
            id = "mina"
            name = "Mina"
            age = 29
            traits = ["curious"]
            current_plan_context = ["Prepare the festival order"]

            [[agents.seeds]]
            content = "Jun ordered a cake"
            importance = 5

            [[agents]]
            id = "jun"
            name = "Jun"
        "#;
        let config = SimulationConfig::from_toml(toml).expect("parse");
        assert_eq!(config.reverie.reflection.threshold, 40);
        assert_eq!(config.reverie.session.dialogue_window, Some(4));
        assert_eq!(config.simulation.turns, 6);
        assert!(config.simulation.start_time.is_some());
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].seeds[0].importance, Some(5));
        let profile = config.agents[0].to_profile().expect("profile");
        assert_eq!(profile.extended.current_plan(), Some("Prepare the festival order"));
        assert!(config.agents[1].seeds.is_empty());
    }

    #[test]
    fn blank_name_is_rejected() {
        let spec = AgentSpec {
            id: "x".into(),
            name: " ".into(),
            age: 0,
            traits: Vec::new(),
            identity_stable_set: Vec::new(),
            lifestyle_and_routine: Vec::new(),
            current_plan_context: Vec::new(),
            seeds: Vec::new(),
        };
        assert!(matches!(spec.to_profile(), Err(ReverieError::InvalidProfile(_))));
    }
}
