//! LLM importance scoring.

use std::sync::Arc;

use async_trait::async_trait;
use reverie_core::error::{Result, ReverieError};
use reverie_core::importance::{ImportanceScorer, ObservationContext};
use serde_json::Value;
use tracing::debug;

use crate::client::LlmClient;
use crate::parse::{extract_json_object, lenient_integer};
use crate::prompt::importance_prompt;
use crate::types::{GenerateOptions, LlmRequest};

/// Asks the model for a 1–10 poignancy score.
///
/// An unparseable answer is an error, so the memory service falls back to
/// its configured default importance.
#[derive(Debug, Clone)]
pub struct LlmImportanceScorer {
    client: Arc<LlmClient>,
    options: GenerateOptions,
}

impl LlmImportanceScorer {
    /// Score with `client` using `options`.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, options: GenerateOptions) -> Self {
        Self { client, options }
    }
}

#[async_trait]
impl ImportanceScorer for LlmImportanceScorer {
    async fn score(&self, text: &str, context: &ObservationContext) -> Result<i64> {
        let request = LlmRequest::new(importance_prompt(text, context))
            .json()
            .with_options(self.options);
        let response = self.client.generate(&request).await?;
        let score = parse_importance(&response.text).ok_or_else(|| {
            ReverieError::Collaborator(format!(
                "unparseable importance answer: {}",
                reverie_core::text::truncate_chars(&response.text, 80)
            ))
        })?;
        debug!(score, latency_ms = response.latency_ms, "Importance scored");
        Ok(score)
    }
}

/// Read the `importance` field from a model answer. Unclamped.
#[must_use]
pub fn parse_importance(text: &str) -> Option<i64> {
    let map = extract_json_object(text)?;
    match map.get("importance")? {
        Value::Bool(_) => None,
        other => lenient_integer(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_and_float_and_string() {
        assert_eq!(parse_importance(r#"{"importance": 8, "reason": "goal"}"#), Some(8));
        assert_eq!(parse_importance(r#"{"importance": 3.6}"#), Some(4));
        assert_eq!(parse_importance(r#"{"importance": "7"}"#), Some(7));
    }

    #[test]
    fn out_of_range_is_returned_unclamped() {
        assert_eq!(parse_importance(r#"{"importance": 42}"#), Some(42));
        assert_eq!(parse_importance(r#"{"importance": "-2"}"#), Some(-2));
    }

    #[test]
    fn recovers_object_from_surrounding_text() {
        assert_eq!(parse_importance("Score: {\"importance\": 6} done"), Some(6));
    }

    #[test]
    fn rejects_booleans_and_missing_fields() {
        assert_eq!(parse_importance(r#"{"importance": true}"#), None);
        assert_eq!(parse_importance(r#"{"score": 5}"#), None);
        assert_eq!(parse_importance("seven"), None);
    }
}
