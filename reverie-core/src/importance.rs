//! Importance scoring for new memories.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Grounding passed to the importance scorer alongside the memory text.
///
/// Every field may be empty; scorers must cope with an agent that has no
/// stable facts or no plan yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationContext {
    /// Name of the agent doing the remembering.
    pub agent_name: String,
    /// Stable identity facts about the agent.
    pub identity_facts: Vec<String>,
    /// Current plan entries, most urgent first.
    pub current_plan: Vec<String>,
}

/// Reflections are scored with the same grounding as observations.
pub type ReflectionContext = ObservationContext;

impl ObservationContext {
    /// Build a context for `agent_name` with no facts or plan.
    #[must_use]
    pub fn for_agent(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            ..Self::default()
        }
    }
}

/// Rates how poignant a memory is on the 1–10 scale.
///
/// The return value is unclamped: the caller clamps into `[1, 10]`, so a
/// scorer may report anything its backend produced.
#[async_trait]
pub trait ImportanceScorer: Send + Sync {
    /// Score `text` for the agent described by `context`.
    ///
    /// # Errors
    ///
    /// Any error makes the caller fall back to its configured default
    /// importance; the memory is still stored.
    async fn score(&self, text: &str, context: &ObservationContext) -> Result<i64>;
}

/// Always returns the same importance.
#[derive(Debug, Clone, Copy)]
pub struct FixedImportanceScorer {
    value: i64,
}

impl FixedImportanceScorer {
    /// A scorer that answers `value` for every memory.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self { value }
    }
}

#[async_trait]
impl ImportanceScorer for FixedImportanceScorer {
    async fn score(&self, _text: &str, _context: &ObservationContext) -> Result<i64> {
        Ok(self.value)
    }
}
