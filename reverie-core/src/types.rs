//! Core type definitions for the Reverie memory substrate.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReverieError, Result};

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of a memory record: its append position in the owning log.
///
/// Ids are assigned monotonically and never reused, so a record may only
/// cite ids strictly smaller than its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u64);

impl MemoryId {
    /// The log position this id corresponds to.
    #[must_use]
    pub fn index(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for MemoryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Timestamp type used throughout the crate.
pub type Timestamp = DateTime<Utc>;

// ---------------------------------------------------------------------------
// Memory Kind
// ---------------------------------------------------------------------------

/// What kind of memory a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Directly perceived fact. Never cites other memories.
    Observation,
    /// Higher-order insight synthesised from earlier memories.
    Reflection,
    /// An intended course of action.
    Plan,
}

impl MemoryKind {
    /// Stable lowercase name, used for persistence and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Reflection => "reflection",
            Self::Plan => "plan",
        }
    }

    /// Parse the stable name produced by [`MemoryKind::as_str`].
    ///
    /// # Errors
    /// Returns [`ReverieError::Serialization`] for an unknown name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "observation" => Ok(Self::Observation),
            "reflection" => Ok(Self::Reflection),
            "plan" => Ok(Self::Plan),
            other => Err(ReverieError::Serialization(format!(
                "unknown memory kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Importance
// ---------------------------------------------------------------------------

/// Lowest importance a stored record can carry.
pub const MIN_IMPORTANCE: i32 = 1;
/// Highest importance a stored record can carry.
pub const MAX_IMPORTANCE: i32 = 10;

/// Clamp any importance value (explicit or scorer output) into `[1, 10]`.
#[must_use]
pub fn clamp_importance(value: i64) -> i32 {
    let clamped = value.clamp(i64::from(MIN_IMPORTANCE), i64::from(MAX_IMPORTANCE));
    i32::try_from(clamped).unwrap_or(MIN_IMPORTANCE)
}

// ---------------------------------------------------------------------------
// Memory Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// A zero vector of the given dimension.
    #[must_use]
    pub fn zeros(dimensions: usize) -> Self {
        Self(vec![0.0; dimensions])
    }

    /// Cosine similarity between two embeddings.
    ///
    /// Returns 0.0 when the dimensions differ or either vector has zero norm.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom.is_normal() {
            (dot / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Fail with [`ReverieError::DimensionMismatch`] unless the vector has
    /// exactly `expected` components.
    ///
    /// # Errors
    /// See above.
    pub fn validate(&self, expected: usize) -> Result<()> {
        if self.0.len() == expected {
            Ok(())
        } else {
            Err(ReverieError::DimensionMismatch {
                expected,
                actual: self.0.len(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Retrieval Score
// ---------------------------------------------------------------------------

/// Composite score used to rank memories during retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetrievalScore(pub OrderedFloat<f64>);

impl RetrievalScore {
    /// Create a retrieval score from a raw f64.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}
