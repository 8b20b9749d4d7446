//! LLM reaction decisions.

use std::sync::Arc;

use async_trait::async_trait;
use reverie_core::error::Result;
use reverie_core::reaction::{ReactionDecider, ReactionDecision, ReactionRequest};
use serde_json::Value;
use tracing::debug;

use crate::client::LlmClient;
use crate::parse::{extract_json_object, string_field};
use crate::prompt::{language_system_prompt, reaction_prompt};
use crate::types::{GenerateOptions, LlmRequest};

/// Asks the model whether and how the agent reacts.
#[derive(Debug, Clone)]
pub struct LlmReactionDecider {
    client: Arc<LlmClient>,
    options: GenerateOptions,
}

impl LlmReactionDecider {
    /// Decide with `client` using `options`.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, options: GenerateOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl ReactionDecider for LlmReactionDecider {
    async fn decide(&self, request: &ReactionRequest) -> Result<ReactionDecision> {
        let llm_request = LlmRequest::new(reaction_prompt(request))
            .with_system(language_system_prompt(request.language))
            .json()
            .with_options(self.options);
        let response = self.client.generate(&llm_request).await?;
        let decision = parse_reaction(&response.text);
        debug!(
            agent = %request.identity().id,
            should_react = decision.should_react,
            retry = request.repetition_guard.is_some(),
            latency_ms = response.latency_ms,
            "Reaction decided"
        );
        Ok(decision)
    }
}

/// Parse a reaction answer. Never fails: anything malformed becomes a
/// silent decision with reason `fallback`.
#[must_use]
pub fn parse_reaction(text: &str) -> ReactionDecision {
    let fallback = ReactionDecision::silent("fallback");
    let Some(map) = extract_json_object(text) else {
        return fallback;
    };
    let Some(should_react) = map.get("should_react").and_then(Value::as_bool) else {
        return fallback;
    };

    let mut utterance = string_field(&map, "utterance");
    if utterance.is_empty() {
        utterance = string_field(&map, "reaction");
    }
    let thought = string_field(&map, "thought");
    let critique = string_field(&map, "critique");
    let reason = match map.get("reason").and_then(Value::as_str) {
        Some(reason) => reason.trim().to_string(),
        None if !critique.is_empty() => critique.clone(),
        None => thought.clone(),
    };

    ReactionDecision {
        should_react,
        utterance,
        reason: if reason.is_empty() { "n/a".to_string() } else { reason },
        thought,
        critique,
    }
}
