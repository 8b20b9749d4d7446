//! A single unit of agent memory.

use serde::{Deserialize, Serialize};

use crate::types::{Embedding, MemoryId, MemoryKind, Timestamp};

/// One entry in an agent's memory stream.
///
/// Content is immutable once appended. The only field that ever changes is
/// `last_accessed_at`, which retrieval refreshes on every returned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Append position in the owning log.
    pub id: MemoryId,
    /// Observation, reflection or plan.
    pub kind: MemoryKind,
    /// Ids of earlier records this one was derived from. Empty for observations.
    pub citations: Vec<MemoryId>,
    /// Natural-language content.
    pub content: String,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the record was last returned by a retrieval.
    pub last_accessed_at: Timestamp,
    /// Salience in `[1, 10]`.
    pub importance: i32,
    /// Semantic embedding of `content`.
    pub embedding: Embedding,
}

impl MemoryRecord {
    /// Hours elapsed between the last access and `now`, never negative.
    #[must_use]
    pub fn hours_since_access(&self, now: Timestamp) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let millis = (now - self.last_accessed_at).num_milliseconds().max(0) as f64;
        millis / 3_600_000.0
    }

    /// Whether this record was synthesised from other memories.
    #[must_use]
    pub fn is_reflection(&self) -> bool {
        self.kind == MemoryKind::Reflection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record_at(ts: Timestamp) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId(0),
            kind: MemoryKind::Observation,
            citations: Vec::new(),
            content: "Isabella is decorating the cafe".to_string(),
            created_at: ts,
            last_accessed_at: ts,
            importance: 4,
            embedding: Embedding::zeros(2),
        }
    }

    #[test]
    fn hours_since_access_counts_fractional_hours() {
        let t0 = Utc.with_ymd_and_hms(2024, 2, 13, 8, 0, 0).single().expect("ts");
        let record = record_at(t0);
        let later = t0 + Duration::minutes(90);
        assert!((record.hours_since_access(later) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn access_in_the_future_counts_as_zero() {
        let t0 = Utc.with_ymd_and_hms(2024, 2, 13, 8, 0, 0).single().expect("ts");
        let record = record_at(t0);
        assert_eq!(record.hours_since_access(t0 - Duration::hours(3)), 0.0);
    }
}
