//! Reaction decisions: should the agent say something, and what.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Language;
use crate::dialogue::DialogueTurn;
use crate::error::Result;
use crate::memory::MemoryRecord;
use crate::persona::{AgentIdentity, AgentProfile};
use crate::types::Timestamp;

/// Outcome of a reaction decision.
///
/// Every field defaults, so partially malformed backend output still
/// deserialises into a well-formed (silent) decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionDecision {
    /// Whether the agent speaks this tick.
    pub should_react: bool,
    /// What the agent says. Empty when silent.
    pub utterance: String,
    /// Short justification.
    pub reason: String,
    /// Private reasoning.
    pub thought: String,
    /// Self-critique of the draft.
    pub critique: String,
}

impl ReactionDecision {
    /// A decision to speak `utterance`.
    #[must_use]
    pub fn speak(utterance: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            should_react: true,
            utterance: utterance.into(),
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// A decision to stay silent.
    #[must_use]
    pub fn silent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    /// The utterance, if the agent actually speaks.
    #[must_use]
    pub fn spoken(&self) -> Option<&str> {
        let text = self.utterance.trim();
        (self.should_react && !text.is_empty()).then_some(text)
    }
}

/// Sent on a retry after a candidate was rejected as repetitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepetitionGuard {
    /// Recent dialogue sentences the candidate overlapped with.
    pub offending_sentences: Vec<String>,
    /// The rejected candidate.
    pub rejected_candidate: String,
    /// Highest allowed n-gram overlap ratio, in `[0, 1]`.
    pub max_overlap: f64,
}

/// Everything a decider gets to look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRequest {
    /// The deciding agent's persona, including its identity.
    pub profile: AgentProfile,
    /// Simulation time of the tick.
    pub current_time: Timestamp,
    /// The observation stored this tick.
    pub observation: String,
    /// Recent dialogue from the agent's point of view, oldest first.
    pub dialogue_history: Vec<DialogueTurn>,
    /// Memories retrieved for this tick, best first.
    pub retrieved_memories: Vec<MemoryRecord>,
    /// Language to answer in.
    pub language: Language,
    /// Present on anti-repetition retries.
    pub repetition_guard: Option<RepetitionGuard>,
}

impl ReactionRequest {
    /// The deciding agent.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        self.profile.identity()
    }
}

/// Decides whether and how an agent reacts.
#[async_trait]
pub trait ReactionDecider: Send + Sync {
    /// Produce a decision for `request`.
    ///
    /// Implementations should turn malformed backend output into a default
    /// decision rather than an error.
    ///
    /// # Errors
    /// Transport failures only; the brain treats them as silence.
    async fn decide(&self, request: &ReactionRequest) -> Result<ReactionDecision>;
}

type Responder = Box<dyn Fn(&ReactionRequest) -> ReactionDecision + Send + Sync>;

/// Deterministic decider for tests and offline runs.
///
/// Queued decisions are served first; after that an optional responder
/// closure answers, otherwise the agent stays silent. Every request is
/// recorded for inspection.
pub struct ScriptedReactionDecider {
    queue: Mutex<VecDeque<ReactionDecision>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<ReactionRequest>>,
}

impl ScriptedReactionDecider {
    /// Serve `decisions` in order, then stay silent.
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = ReactionDecision>) -> Self {
        Self {
            queue: Mutex::new(decisions.into_iter().collect()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `responder`.
    #[must_use]
    pub fn responding_with(
        responder: impl Fn(&ReactionRequest) -> ReactionDecision + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ReactionRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl std::fmt::Debug for ScriptedReactionDecider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedReactionDecider")
            .field("queued", &self.queue.lock().len())
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReactionDecider for ScriptedReactionDecider {
    async fn decide(&self, request: &ReactionRequest) -> Result<ReactionDecision> {
        self.requests.lock().push(request.clone());
        if let Some(decision) = self.queue.lock().pop_front() {
            return Ok(decision);
        }
        Ok(match &self.responder {
            Some(responder) => responder(request),
            None => ReactionDecision::silent("script exhausted"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_silence() {
        let decision: ReactionDecision =
            serde_json::from_str(r#"{"reason": "busy"}"#).expect("parse");
        assert!(!decision.should_react);
        assert_eq!(decision.reason, "busy");
        assert!(decision.spoken().is_none());
    }

    #[test]
    fn blank_utterance_is_not_spoken() {
        let decision = ReactionDecision::speak("   ", "reply");
        assert!(decision.spoken().is_none());
        assert_eq!(ReactionDecision::speak(" Hi! ", "reply").spoken(), Some("Hi!"));
    }
}
