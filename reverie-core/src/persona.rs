//! Agent identity and persona.
//!
//! An agent is an immutable [`AgentIdentity`] plus an [`AgentProfile`]: the
//! stable facts of its [`FixedPersona`] and the mutable routine and plan
//! stack of its [`ExtendedPersona`].

use serde::{Deserialize, Serialize};

use crate::error::{ReverieError, Result};
use crate::importance::ObservationContext;

/// Who an agent is. Never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable identifier, unique within a session.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Age in years.
    #[serde(default)]
    pub age: u32,
    /// Innate traits, e.g. "friendly", "curious".
    #[serde(default)]
    pub traits: Vec<String>,
}

/// Stable identity facts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPersona {
    /// Facts that hold for the agent's whole lifetime.
    #[serde(default)]
    pub identity_stable_set: Vec<String>,
}

/// Routine and plans. The plan stack's top is index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPersona {
    /// Daily routine lines.
    #[serde(default)]
    pub lifestyle_and_routine: Vec<String>,
    /// Current plans, most urgent first.
    #[serde(default)]
    pub current_plan_context: Vec<String>,
}

impl ExtendedPersona {
    /// The plan on top of the stack.
    #[must_use]
    pub fn current_plan(&self) -> Option<&str> {
        self.current_plan_context.first().map(String::as_str)
    }

    /// Put `plan` on top of the stack.
    pub fn push_plan(&mut self, plan: impl Into<String>) {
        self.current_plan_context.insert(0, plan.into());
    }

    /// Remove and return the plan on top of the stack.
    pub fn pop_plan(&mut self) -> Option<String> {
        if self.current_plan_context.is_empty() {
            None
        } else {
            Some(self.current_plan_context.remove(0))
        }
    }
}

/// A validated agent: identity plus persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    identity: AgentIdentity,
    /// Stable facts.
    pub fixed: FixedPersona,
    /// Routine and plan stack.
    pub extended: ExtendedPersona,
}

impl AgentProfile {
    /// Validate and assemble a profile.
    ///
    /// # Errors
    /// Returns [`ReverieError::InvalidProfile`] if the id or name is blank,
    /// or if any trait, fact, routine line or plan entry is blank.
    pub fn new(
        identity: AgentIdentity,
        fixed: FixedPersona,
        extended: ExtendedPersona,
    ) -> Result<Self> {
        if identity.id.trim().is_empty() {
            return Err(ReverieError::InvalidProfile("agent id is empty".into()));
        }
        if identity.name.trim().is_empty() {
            return Err(ReverieError::InvalidProfile(format!(
                "agent '{}' has an empty name",
                identity.id
            )));
        }
        let sections = [
            ("traits", &identity.traits),
            ("identity_stable_set", &fixed.identity_stable_set),
            ("lifestyle_and_routine", &extended.lifestyle_and_routine),
            ("current_plan_context", &extended.current_plan_context),
        ];
        for (section, lines) in sections {
            if lines.iter().any(|l| l.trim().is_empty()) {
                return Err(ReverieError::InvalidProfile(format!(
                    "agent '{}' has a blank entry in {section}",
                    identity.id
                )));
            }
        }
        Ok(Self {
            identity,
            fixed,
            extended,
        })
    }

    /// The agent's identity.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Grounding handed to the importance scorer.
    #[must_use]
    pub fn observation_context(&self) -> ObservationContext {
        ObservationContext {
            agent_name: self.identity.name.clone(),
            identity_facts: self.fixed.identity_stable_set.clone(),
            current_plan: self.extended.current_plan_context.clone(),
        }
    }
}
