//! Append-only per-agent memory log with retrieval ranking.

use std::collections::HashSet;

use tracing::debug;

use crate::config::{RetrievalConfig, RetrievalWeights};
use crate::error::{ReverieError, Result};
use crate::memory::MemoryRecord;
use crate::retrieval::{rank_candidates, RetrievalResult};
use crate::types::{clamp_importance, Embedding, MemoryId, MemoryKind, Timestamp};

/// Ordered, append-only storage for one agent's memories.
///
/// A log has a single writer: all appends and retrievals for one agent run
/// sequentially within that agent's tick.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    dimension: usize,
    weights: RetrievalWeights,
    recency_decay: f64,
    records: Vec<MemoryRecord>,
}

impl MemoryLog {
    /// Create an empty log that accepts embeddings of `dimension` components,
    /// scoring with default weights and decay.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self::with_retrieval(dimension, &RetrievalConfig::default())
    }

    /// Create an empty log using the weights and decay from `retrieval`.
    #[must_use]
    pub fn with_retrieval(dimension: usize, retrieval: &RetrievalConfig) -> Self {
        Self {
            dimension,
            weights: retrieval.weights,
            recency_decay: retrieval.recency_decay,
            records: Vec::new(),
        }
    }

    /// Rebuild a log from previously persisted records.
    ///
    /// # Errors
    /// Returns [`ReverieError::Serialization`] if ids are not exactly
    /// `0..len` in order or a record cites a non-earlier id, and
    /// [`ReverieError::DimensionMismatch`] if any embedding has the wrong size.
    pub fn from_records(
        dimension: usize,
        retrieval: &RetrievalConfig,
        records: Vec<MemoryRecord>,
    ) -> Result<Self> {
        for (position, record) in records.iter().enumerate() {
            if record.id.index() != position {
                return Err(ReverieError::Serialization(format!(
                    "memory log is not contiguous: expected id {position}, found {}",
                    record.id
                )));
            }
            if let Some(bad) = record.citations.iter().find(|c| **c >= record.id) {
                return Err(ReverieError::Serialization(format!(
                    "record {} cites non-earlier record {bad}",
                    record.id
                )));
            }
            record.embedding.validate(dimension)?;
        }
        let mut log = Self::with_retrieval(dimension, retrieval);
        log.records = records;
        Ok(log)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append a record and return a copy of it.
    ///
    /// The new id is the log length before the append. Importance is clamped
    /// into `[1, 10]`. Observations never keep citations, and citations to
    /// ids that are not already in the log are dropped.
    ///
    /// # Errors
    /// Returns [`ReverieError::DimensionMismatch`] if `embedding` does not
    /// have the configured dimension; the log is left untouched.
    pub fn append(
        &mut self,
        kind: MemoryKind,
        citations: &[MemoryId],
        content: impl Into<String>,
        now: Timestamp,
        importance: i64,
        embedding: Embedding,
    ) -> Result<MemoryRecord> {
        embedding.validate(self.dimension)?;

        let citations = if kind == MemoryKind::Observation {
            Vec::new()
        } else {
            self.filter_citations(citations)
        };

        let id = MemoryId(self.records.len() as u64);
        let record = MemoryRecord {
            id,
            kind,
            citations,
            content: content.into(),
            created_at: now,
            last_accessed_at: now,
            importance: clamp_importance(importance),
            embedding,
        };
        debug!(
            memory_id = id.0,
            kind = %kind,
            importance = record.importance,
            citations = record.citations.len(),
            "Appended memory"
        );
        self.records.push(record.clone());
        Ok(record)
    }

    /// Keep only ids already present in the log, deduplicated, first
    /// occurrence order preserved.
    #[must_use]
    pub fn filter_citations(&self, candidates: &[MemoryId]) -> Vec<MemoryId> {
        let mut seen = HashSet::with_capacity(candidates.len());
        candidates
            .iter()
            .copied()
            .filter(|id| self.contains(*id) && seen.insert(*id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    /// Return up to `top_k` records ranked for `query`, refreshing
    /// `last_accessed_at = now` on each returned record.
    ///
    /// # Errors
    /// Returns [`ReverieError::DimensionMismatch`] if the query embedding
    /// does not have the configured dimension.
    pub fn retrieve(
        &mut self,
        query: &Embedding,
        top_k: usize,
        now: Timestamp,
    ) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .retrieve_scored(query, top_k, now)?
            .into_iter()
            .map(|r| r.record)
            .collect())
    }

    /// Like [`MemoryLog::retrieve`] but keeps each record's score breakdown.
    ///
    /// # Errors
    /// See [`MemoryLog::retrieve`].
    pub fn retrieve_scored(
        &mut self,
        query: &Embedding,
        top_k: usize,
        now: Timestamp,
    ) -> Result<Vec<RetrievalResult>> {
        query.validate(self.dimension)?;
        if self.records.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let ranked = rank_candidates(
            &self.records,
            query,
            now,
            &self.weights,
            self.recency_decay,
        );

        let results: Vec<RetrievalResult> = ranked
            .into_iter()
            .take(top_k)
            .map(|candidate| {
                let record = &mut self.records[candidate.position];
                record.last_accessed_at = now;
                RetrievalResult {
                    record: record.clone(),
                    score: candidate.score.value(),
                    breakdown: candidate.breakdown,
                }
            })
            .collect();

        debug!(
            candidates = self.records.len(),
            returned = results.len(),
            top_k,
            "Retrieved memories"
        );
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Whether `id` names a record in this log.
    #[must_use]
    pub fn contains(&self, id: MemoryId) -> bool {
        id.index() < self.records.len()
    }

    /// Look up a record by id.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryRecord> {
        self.records.get(id.index())
    }

    /// All records in append order.
    #[must_use]
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// The last `n` records in append order.
    #[must_use]
    pub fn most_recent(&self, n: usize) -> &[MemoryRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured embedding dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Weights used for ranking.
    #[must_use]
    pub fn weights(&self) -> &RetrievalWeights {
        &self.weights
    }

    /// Per-hour recency decay base.
    #[must_use]
    pub fn recency_decay(&self) -> f64 {
        self.recency_decay
    }
}
