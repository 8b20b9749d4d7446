//! Memory service: turns raw content into scored, embedded memory records.
//!
//! Callers never touch the scorer or encoder directly. The service resolves
//! importance (explicit value or scorer call with fallback), clamps it,
//! embeds text when needed and appends to the owned [`MemoryLog`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ReverieConfig;
use crate::embedding::EmbeddingEncoder;
use crate::error::{ReverieError, Result};
use crate::importance::{ImportanceScorer, ObservationContext, ReflectionContext};
use crate::memory::{MemoryLog, MemoryRecord};
use crate::reflection::Insight;
use crate::types::{Embedding, MemoryKind, Timestamp};

/// Direction for [`MemoryService::get_recent_memories`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    #[default]
    Descending,
}

/// Facade over one agent's memory log and its scoring collaborators.
pub struct MemoryService {
    log: MemoryLog,
    scorer: Arc<dyn ImportanceScorer>,
    encoder: Arc<dyn EmbeddingEncoder>,
    fallback_importance: i32,
    timeout: Duration,
}

impl std::fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryService")
            .field("records", &self.log.len())
            .field("encoder", &self.encoder.model_name())
            .field("fallback_importance", &self.fallback_importance)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MemoryService {
    /// Create a service over an empty log sized from `config`.
    #[must_use]
    pub fn new(
        config: &ReverieConfig,
        scorer: Arc<dyn ImportanceScorer>,
        encoder: Arc<dyn EmbeddingEncoder>,
    ) -> Self {
        let log = MemoryLog::with_retrieval(config.memory.embedding_dimension, &config.retrieval);
        Self::with_log(config, log, scorer, encoder)
    }

    /// Create a service over an existing (for example, reloaded) log.
    #[must_use]
    pub fn with_log(
        config: &ReverieConfig,
        log: MemoryLog,
        scorer: Arc<dyn ImportanceScorer>,
        encoder: Arc<dyn EmbeddingEncoder>,
    ) -> Self {
        Self {
            log,
            scorer,
            encoder,
            fallback_importance: config.memory.fallback_importance,
            timeout: Duration::from_millis(config.memory.collaborator_timeout_ms),
        }
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Store an observation with a pre-computed embedding.
    ///
    /// When `importance` is `None` the scorer is consulted; a scorer failure
    /// or timeout falls back to the configured default importance.
    ///
    /// # Errors
    /// Returns [`ReverieError::DimensionMismatch`] if `embedding` has the
    /// wrong dimension.
    pub async fn create_observation(
        &mut self,
        content: &str,
        now: Timestamp,
        embedding: Embedding,
        context: &ObservationContext,
        importance: Option<i64>,
    ) -> Result<MemoryRecord> {
        let importance = self.resolve_importance(content, context, importance).await;
        self.log
            .append(MemoryKind::Observation, &[], content, now, importance, embedding)
    }

    /// Store an observation, embedding `content` with the encoder first.
    ///
    /// # Errors
    /// Returns an error if the encoder fails or times out, or if it returns a
    /// vector of the wrong dimension.
    pub async fn create_observation_from_text(
        &mut self,
        content: &str,
        now: Timestamp,
        context: &ObservationContext,
        importance: Option<i64>,
    ) -> Result<MemoryRecord> {
        let embedding = self.encode(content).await?;
        self.create_observation(content, now, embedding, context, importance)
            .await
    }

    /// Store a reflection synthesised from earlier memories.
    ///
    /// Citation ids are deduplicated in first-occurrence order and ids not
    /// currently in the log are dropped silently.
    ///
    /// # Errors
    /// Returns an error if embedding the insight fails.
    pub async fn create_reflection(
        &mut self,
        insight: &Insight,
        now: Timestamp,
        context: &ReflectionContext,
        importance: Option<i64>,
    ) -> Result<MemoryRecord> {
        let embedding = self.encode(&insight.text).await?;
        let importance = self.resolve_importance(&insight.text, context, importance).await;
        let citations = self.log.filter_citations(&insight.citation_ids);
        if citations.len() != insight.citation_ids.len() {
            debug!(
                requested = insight.citation_ids.len(),
                kept = citations.len(),
                "Filtered reflection citations"
            );
        }
        self.log.append(
            MemoryKind::Reflection,
            &citations,
            insight.text.as_str(),
            now,
            importance,
            embedding,
        )
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Records sorted by creation time, optionally truncated to `limit`.
    #[must_use]
    pub fn get_recent_memories(&self, limit: Option<usize>, order: SortOrder) -> Vec<MemoryRecord> {
        let mut records = self.log.records().to_vec();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if order == SortOrder::Descending {
            records.reverse();
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    /// Embed `query_text` and return the `top_k` best-ranked records,
    /// refreshing their last-access time.
    ///
    /// # Errors
    /// Returns an error if the encoder fails, times out, or returns the
    /// wrong dimension.
    pub async fn get_retrieval_memories(
        &mut self,
        query_text: &str,
        now: Timestamp,
        top_k: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let query = self.encode(query_text).await?;
        self.log.retrieve(&query, top_k, now)
    }

    /// Embed `text` with the encoder under the collaborator timeout.
    ///
    /// # Errors
    /// Returns the encoder's error, [`ReverieError::Timeout`], or
    /// [`ReverieError::DimensionMismatch`] if the vector has the wrong size.
    pub async fn encode(&self, text: &str) -> Result<Embedding> {
        let embedding = self.bounded("embedding", self.encoder.encode(text)).await?;
        embedding.validate(self.log.dimension())?;
        Ok(embedding)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The underlying log.
    #[must_use]
    pub fn log(&self) -> &MemoryLog {
        &self.log
    }

    /// Mutable access to the underlying log.
    pub fn log_mut(&mut self) -> &mut MemoryLog {
        &mut self.log
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The shared encoder.
    #[must_use]
    pub fn encoder(&self) -> Arc<dyn EmbeddingEncoder> {
        Arc::clone(&self.encoder)
    }

    /// Budget applied to each collaborator call.
    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        self.timeout
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn resolve_importance(
        &self,
        text: &str,
        context: &ObservationContext,
        explicit: Option<i64>,
    ) -> i64 {
        if let Some(value) = explicit {
            return value;
        }
        let start = Instant::now();
        match self.bounded("importance scoring", self.scorer.score(text, context)).await {
            Ok(value) => {
                debug!(
                    agent = %context.agent_name,
                    importance = value,
                    elapsed_us = start.elapsed().as_micros(),
                    "Scored importance"
                );
                value
            }
            Err(e) => {
                warn!(
                    agent = %context.agent_name,
                    error = %e,
                    fallback = self.fallback_importance,
                    "Importance scoring failed, using fallback"
                );
                i64::from(self.fallback_importance)
            }
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ReverieError::Timeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
