//! LLM-backed reflection stages.
//!
//! One [`LlmReflector`] serves as question generator, insight generator and
//! citation linker. The insight stage asks the model to cite statement
//! numbers; the linker then answers from what the last insight call
//! recorded, so each agent needs its own instance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reverie_core::config::RetrievalConfig;
use reverie_core::embedding::EmbeddingEncoder;
use reverie_core::error::Result;
use reverie_core::importance::ReflectionContext;
use reverie_core::memory::MemoryRecord;
use reverie_core::reflection::{
    CitationLinker, EmbeddingQuestionRetriever, InsightGenerator, QuestionEvidence,
    QuestionGenerator, ReflectionStages,
};
use reverie_core::types::MemoryId;
use serde_json::Value;
use tracing::debug;

use crate::client::LlmClient;
use crate::parse::{extract_json_object, string_list};
use crate::prompt::{insights_prompt, questions_prompt};
use crate::types::{GenerateOptions, LlmRequest};

/// Question, insight and citation stages driven by one model.
pub struct LlmReflector {
    client: Arc<LlmClient>,
    options: GenerateOptions,
    citations: Mutex<HashMap<String, Vec<MemoryId>>>,
}

impl LlmReflector {
    /// Reflect with `client` using `options`.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, options: GenerateOptions) -> Self {
        Self {
            client,
            options,
            citations: Mutex::new(HashMap::new()),
        }
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        let request = LlmRequest::new(prompt).json().with_options(self.options);
        Ok(self.client.generate(&request).await?.text)
    }
}

impl std::fmt::Debug for LlmReflector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmReflector")
            .field("client", &self.client)
            .field("cached_insights", &self.citations.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QuestionGenerator for LlmReflector {
    async fn generate_questions(
        &self,
        memories: &[MemoryRecord],
        count: usize,
        context: &ReflectionContext,
    ) -> Result<Vec<String>> {
        if memories.is_empty() || count == 0 {
            return Ok(Vec::new());
        }
        let statements: Vec<&MemoryRecord> = memories.iter().collect();
        let text = self
            .ask(questions_prompt(&context.agent_name, &statements, count))
            .await?;
        let mut questions = parse_questions(&text);
        questions.truncate(count);
        debug!(agent = %context.agent_name, questions = questions.len(), "Reflection questions");
        Ok(questions)
    }
}

#[async_trait]
impl InsightGenerator for LlmReflector {
    async fn generate_insights(
        &self,
        _questions: &[String],
        evidence: &QuestionEvidence,
        count: usize,
        context: &ReflectionContext,
    ) -> Result<Vec<String>> {
        self.citations.lock().clear();
        let statements = evidence.all_records();
        if statements.is_empty() || count == 0 {
            return Ok(Vec::new());
        }
        let text = self
            .ask(insights_prompt(&context.agent_name, &statements, count))
            .await?;
        let mut parsed = parse_insights(&text, &statements);
        parsed.truncate(count);

        let mut cache = self.citations.lock();
        let insights = parsed
            .into_iter()
            .map(|(insight, ids)| {
                cache.insert(insight.clone(), ids);
                insight
            })
            .collect::<Vec<_>>();
        debug!(agent = %context.agent_name, insights = insights.len(), "Reflection insights");
        Ok(insights)
    }
}

#[async_trait]
impl CitationLinker for LlmReflector {
    async fn link_citations(
        &self,
        insights: &[String],
        _evidence: &QuestionEvidence,
    ) -> Result<Vec<Vec<MemoryId>>> {
        let cache = self.citations.lock();
        Ok(insights
            .iter()
            .map(|insight| cache.get(insight).cloned().unwrap_or_default())
            .collect())
    }
}

/// Reflection stages backed by `client`, with embedding-ranked evidence.
#[must_use]
pub fn llm_reflection_stages(
    client: Arc<LlmClient>,
    options: GenerateOptions,
    encoder: Arc<dyn EmbeddingEncoder>,
    retrieval: &RetrievalConfig,
) -> ReflectionStages {
    let reflector = Arc::new(LlmReflector::new(client, options));
    ReflectionStages {
        questions: reflector.clone(),
        retriever: Arc::new(EmbeddingQuestionRetriever::new(
            encoder,
            retrieval.weights,
            retrieval.recency_decay,
        )),
        insights: reflector.clone(),
        linker: reflector,
    }
}

/// Questions from a `{"questions": [...]}` answer; empty when malformed.
#[must_use]
pub fn parse_questions(text: &str) -> Vec<String> {
    extract_json_object(text)
        .map(|map| string_list(map.get("questions")))
        .unwrap_or_default()
}

/// Insights with their cited memory ids. Statement `n` maps to
/// `statements[n - 1]`; out-of-range and non-integer numbers are dropped.
#[must_use]
pub fn parse_insights(text: &str, statements: &[&MemoryRecord]) -> Vec<(String, Vec<MemoryId>)> {
    let Some(map) = extract_json_object(text) else {
        return Vec::new();
    };
    let Some(items) = map.get("insights").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let insight = item.get("insight")?.as_str()?.trim();
            if insight.is_empty() {
                return None;
            }
            let ids = item
                .get("citation_statement_numbers")
                .and_then(Value::as_array)
                .map(|numbers| {
                    numbers
                        .iter()
                        .filter_map(Value::as_i64)
                        .filter_map(|n| usize::try_from(n).ok()?.checked_sub(1))
                        .filter_map(|i| statements.get(i).map(|m| m.id))
                        .collect()
                })
                .unwrap_or_default();
            Some((insight.to_string(), ids))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reverie_core::types::{Embedding, MemoryKind};

    fn record(id: u64, content: &str) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: MemoryId(id),
            kind: MemoryKind::Observation,
            citations: Vec::new(),
            content: content.to_string(),
            created_at: now,
            last_accessed_at: now,
            importance: 5,
            embedding: Embedding::zeros(4),
        }
    }

    #[test]
    fn questions_skip_blank_and_non_strings() {
        let qs = parse_questions(r#"{"questions": ["Why?", "  ", 4, "How?"]}"#);
        assert_eq!(qs, vec!["Why?", "How?"]);
        assert!(parse_questions(r#"{"questions": "Why?"}"#).is_empty());
        assert!(parse_questions("nope").is_empty());
    }

    #[test]
    fn insights_map_statement_numbers_to_ids() {
        let a = record(7, "Jun likes tea");
        let b = record(12, "Jun visits the cafe daily");
        let statements = vec![&a, &b];
        let text = r#"{"insights": [
            {"insight": "Jun is a regular", "citation_statement_numbers": [2, 1, 9, 0, "1", 1.0]},
            {"insight": "   ", "citation_statement_numbers": [1]},
            "not an object",
            {"insight": "Jun enjoys routine"}
        ]}"#;
        let parsed = parse_insights(text, &statements);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("Jun is a regular".to_string(), vec![MemoryId(12), MemoryId(7)]));
        assert_eq!(parsed[1], ("Jun enjoys routine".to_string(), Vec::new()));
    }

    #[tokio::test]
    async fn linker_answers_from_last_insight_call_only() {
        let reflector = LlmReflector::new(Arc::new(LlmClient::none()), GenerateOptions::default());
        reflector
            .citations
            .lock()
            .insert("old".into(), vec![MemoryId(1)]);
        let evidence = QuestionEvidence::new();
        let out = reflector
            .link_citations(&["old".into(), "new".into()], &evidence)
            .await
            .expect("link");
        assert_eq!(out, vec![vec![MemoryId(1)], Vec::new()]);

        // Empty evidence short-circuits but still clears stale citations.
        let ctx = ReflectionContext::for_agent("Mina");
        let insights = reflector
            .generate_insights(&[], &evidence, 3, &ctx)
            .await
            .expect("no call made");
        assert!(insights.is_empty());
        let out = reflector
            .link_citations(&["old".into()], &evidence)
            .await
            .expect("link");
        assert_eq!(out, vec![Vec::<MemoryId>::new()]);
    }
}
