//! Memory retrieval: multi-factor ranking of a memory stream against a query.
//!
//! The ranking combines three weighted, min-max normalised factors:
//!   Score = α·Recency + β·Importance + γ·Relevance
//!
//! With the default weights every score lies in `[0, 3]`.

pub mod scoring;

use crate::memory::MemoryRecord;

pub use scoring::{rank_candidates, RankedCandidate};

/// A scored retrieval result.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// The retrieved memory, with its refreshed `last_accessed_at`.
    pub record: MemoryRecord,
    /// Combined retrieval score.
    pub score: f64,
    /// Per-factor breakdown.
    pub breakdown: ScoreBreakdown,
}

/// Breakdown of a retrieval score into its weighted, normalised factors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Recency contribution.
    pub recency: f64,
    /// Importance contribution.
    pub importance: f64,
    /// Relevance contribution.
    pub relevance: f64,
}

impl ScoreBreakdown {
    /// Sum of the three contributions.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.recency + self.importance + self.relevance
    }
}
