//! Replaceable reflection stages and their model-free implementations.
//!
//! Each stage is a narrow trait so heuristic, template-based and
//! model-backed strategies can be swapped without touching the pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{RetrievalWeights, RolloverKind};
use crate::embedding::EmbeddingEncoder;
use crate::error::Result;
use crate::importance::ReflectionContext;
use crate::memory::MemoryRecord;
use crate::retrieval::rank_candidates;
use crate::text::{truncate_chars, word_tokens};
use crate::types::MemoryId;

// ---------------------------------------------------------------------------
// Question evidence
// ---------------------------------------------------------------------------

/// Evidence gathered per salient question, in question order.
///
/// Each distinct question appears once; a repeated question keeps the
/// evidence gathered the first time.
#[derive(Debug, Clone, Default)]
pub struct QuestionEvidence {
    entries: Vec<(String, Vec<MemoryRecord>)>,
}

impl QuestionEvidence {
    /// Empty evidence map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the evidence for `question` unless it is already present.
    pub fn insert(&mut self, question: impl Into<String>, records: Vec<MemoryRecord>) {
        let question = question.into();
        if self.get(&question).is_none() {
            self.entries.push((question, records));
        }
    }

    /// Evidence retrieved for `question`.
    #[must_use]
    pub fn get(&self, question: &str) -> Option<&[MemoryRecord]> {
        self.entries
            .iter()
            .find(|(q, _)| q == question)
            .map(|(_, records)| records.as_slice())
    }

    /// Iterate `(question, evidence)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MemoryRecord])> {
        self.entries.iter().map(|(q, r)| (q.as_str(), r.as_slice()))
    }

    /// Every evidence record across all questions, deduplicated by id,
    /// first occurrence order.
    #[must_use]
    pub fn all_records(&self) -> Vec<&MemoryRecord> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .flat_map(|(_, records)| records.iter())
            .filter(|r| seen.insert(r.id))
            .collect()
    }

    /// Number of questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no question was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Stage traits
// ---------------------------------------------------------------------------

/// Stage 2: derive salient questions from recent memories.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Produce up to `count` questions. An empty `memories` slice is valid.
    ///
    /// # Errors
    /// Backend failures; the pipeline treats them as "no questions".
    async fn generate_questions(
        &self,
        memories: &[MemoryRecord],
        count: usize,
        context: &ReflectionContext,
    ) -> Result<Vec<String>>;
}

/// Stage 3: find evidence for one question among the candidate memories.
#[async_trait]
pub trait QuestionRetriever: Send + Sync {
    /// Return up to `top_k` records from `memories` relevant to `question`.
    ///
    /// # Errors
    /// Backend failures; the pipeline treats them as "no evidence".
    async fn retrieve_for_question(
        &self,
        question: &str,
        memories: &[MemoryRecord],
        top_k: usize,
    ) -> Result<Vec<MemoryRecord>>;
}

/// Stage 4: synthesise insights from questions and their evidence.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    /// Produce up to `count` insight sentences.
    ///
    /// # Errors
    /// Backend failures; the pipeline treats them as "no insights".
    async fn generate_insights(
        &self,
        questions: &[String],
        evidence: &QuestionEvidence,
        count: usize,
        context: &ReflectionContext,
    ) -> Result<Vec<String>>;
}

/// Stage 5: attach supporting memory ids to each insight.
#[async_trait]
pub trait CitationLinker: Send + Sync {
    /// One citation list per insight, positionally aligned. Returning fewer
    /// lists than insights is tolerated.
    ///
    /// # Errors
    /// Backend failures; the pipeline treats them as "no citations".
    async fn link_citations(
        &self,
        insights: &[String],
        evidence: &QuestionEvidence,
    ) -> Result<Vec<Vec<MemoryId>>>;
}

/// Stage 7: update the salience counter after a run.
pub trait RolloverPolicy: Send + Sync {
    /// New counter value given the value before the run.
    fn rollover(&self, accumulated_before_run: i64) -> i64;
}

// ---------------------------------------------------------------------------
// Rollover policies
// ---------------------------------------------------------------------------

/// Counter returns to zero after every run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetToZero;

impl RolloverPolicy for ResetToZero {
    fn rollover(&self, _accumulated_before_run: i64) -> i64 {
        0
    }
}

/// Counter keeps whatever exceeded the threshold, never below zero.
#[derive(Debug, Clone, Copy)]
pub struct CarryOverExcess {
    threshold: i64,
}

impl CarryOverExcess {
    /// Carry the excess over `threshold`.
    #[must_use]
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }
}

impl RolloverPolicy for CarryOverExcess {
    fn rollover(&self, accumulated_before_run: i64) -> i64 {
        accumulated_before_run.saturating_sub(self.threshold).max(0)
    }
}

/// Build the configured rollover policy.
#[must_use]
pub fn rollover_policy(kind: RolloverKind, threshold: i64) -> Box<dyn RolloverPolicy> {
    match kind {
        RolloverKind::Reset => Box::new(ResetToZero),
        RolloverKind::CarryExcess => Box::new(CarryOverExcess::new(threshold)),
    }
}

// ---------------------------------------------------------------------------
// Heuristic stages
// ---------------------------------------------------------------------------

/// Questions seeded from the most important recent memories.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateQuestionGenerator;

#[async_trait]
impl QuestionGenerator for TemplateQuestionGenerator {
    async fn generate_questions(
        &self,
        memories: &[MemoryRecord],
        count: usize,
        context: &ReflectionContext,
    ) -> Result<Vec<String>> {
        let subject = subject_name(context);
        let mut ranked: Vec<&MemoryRecord> = memories.iter().collect();
        ranked.sort_by(|a, b| b.importance.cmp(&a.importance).then(b.id.cmp(&a.id)));

        let mut seen = HashSet::new();
        Ok(ranked
            .into_iter()
            .map(|r| {
                format!(
                    "What does {subject} make of \"{}\"?",
                    truncate_chars(r.content.trim(), 80)
                )
            })
            .filter(|q| seen.insert(q.clone()))
            .take(count)
            .collect())
    }
}

/// Ranks the candidate set against the embedded question with the standard
/// retrieval score, without touching any access timestamps.
pub struct EmbeddingQuestionRetriever {
    encoder: Arc<dyn EmbeddingEncoder>,
    weights: RetrievalWeights,
    recency_decay: f64,
}

impl EmbeddingQuestionRetriever {
    /// Create a retriever scoring with `weights` and `recency_decay`.
    #[must_use]
    pub fn new(
        encoder: Arc<dyn EmbeddingEncoder>,
        weights: RetrievalWeights,
        recency_decay: f64,
    ) -> Self {
        Self {
            encoder,
            weights,
            recency_decay,
        }
    }
}

#[async_trait]
impl QuestionRetriever for EmbeddingQuestionRetriever {
    async fn retrieve_for_question(
        &self,
        question: &str,
        memories: &[MemoryRecord],
        top_k: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let Some(now) = memories.iter().map(|r| r.last_accessed_at).max() else {
            return Ok(Vec::new());
        };
        let query = self.encoder.encode(question).await?;
        Ok(rank_candidates(memories, &query, now, &self.weights, self.recency_decay)
            .into_iter()
            .take(top_k)
            .map(|c| memories[c.position].clone())
            .collect())
    }
}

/// One insight per question that found evidence, summarising its strongest
/// supporting memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateInsightGenerator;

#[async_trait]
impl InsightGenerator for TemplateInsightGenerator {
    async fn generate_insights(
        &self,
        questions: &[String],
        evidence: &QuestionEvidence,
        count: usize,
        context: &ReflectionContext,
    ) -> Result<Vec<String>> {
        let subject = subject_name(context);
        let mut seen = HashSet::new();
        Ok(questions
            .iter()
            .filter_map(|q| evidence.get(q).and_then(<[MemoryRecord]>::first))
            .map(|top| {
                format!(
                    "{subject} keeps coming back to this: {}",
                    truncate_chars(top.content.trim(), 120)
                )
            })
            .filter(|insight| seen.insert(insight.clone()))
            .take(count)
            .collect())
    }
}

/// Cites every evidence record sharing a content word with the insight;
/// falls back to all evidence when nothing overlaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceCitationLinker;

#[async_trait]
impl CitationLinker for EvidenceCitationLinker {
    async fn link_citations(
        &self,
        insights: &[String],
        evidence: &QuestionEvidence,
    ) -> Result<Vec<Vec<MemoryId>>> {
        let records = evidence.all_records();
        Ok(insights
            .iter()
            .map(|insight| {
                let words: HashSet<String> = content_words(insight);
                let overlapping: Vec<MemoryId> = records
                    .iter()
                    .filter(|r| !content_words(&r.content).is_disjoint(&words))
                    .map(|r| r.id)
                    .collect();
                if overlapping.is_empty() {
                    records.iter().map(|r| r.id).collect()
                } else {
                    overlapping
                }
            })
            .collect())
    }
}

fn subject_name(context: &ReflectionContext) -> &str {
    if context.agent_name.trim().is_empty() {
        "the agent"
    } else {
        context.agent_name.as_str()
    }
}

fn content_words(text: &str) -> HashSet<String> {
    word_tokens(text)
        .into_iter()
        .filter(|w| w.chars().count() > 3)
        .collect()
}
