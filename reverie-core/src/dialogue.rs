//! Dialogue history as seen by one agent.

use serde::{Deserialize, Serialize};

/// One exchange from a speaker's point of view: what the partner said and
/// what the speaker answered. Either side may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// What the partner said.
    pub partner: String,
    /// What this agent said back.
    pub own: String,
}

impl DialogueTurn {
    /// A turn with both sides filled.
    #[must_use]
    pub fn new(partner: impl Into<String>, own: impl Into<String>) -> Self {
        Self {
            partner: partner.into(),
            own: own.into(),
        }
    }

    /// A turn the speaker has not answered yet.
    #[must_use]
    pub fn pending(partner: impl Into<String>) -> Self {
        Self::new(partner, String::new())
    }

    /// Whether the speaker still owes a reply.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.own.is_empty()
    }
}
