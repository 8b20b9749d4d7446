//! Per-factor scoring functions for memory retrieval.
//!
//! Score = α·norm(Recency) + β·norm(Importance) + γ·norm(Relevance)
//!
//! Where:
//!   Recency(m)    = decay ^ hours_since(m.last_accessed_at)
//!   Importance(m) = stored importance, 1–10
//!   Relevance(m)  = cosine_similarity(query, m.embedding)
//!
//! Each raw series is min-max normalised across the candidate set. A series
//! whose values are all equal normalises to 0.5 everywhere.

use std::cmp::Ordering;

use crate::config::RetrievalWeights;
use crate::memory::MemoryRecord;
use crate::retrieval::ScoreBreakdown;
use crate::types::{Embedding, RetrievalScore, Timestamp};

/// Exponential recency decay `decay ^ max(hours, 0)`, in `(0, 1]`.
#[must_use]
pub fn recency_factor(hours_since_access: f64, decay: f64) -> f64 {
    decay.powf(hours_since_access.max(0.0))
}

/// Cosine relevance, 0 on dimension mismatch or zero norm.
#[must_use]
pub fn relevance_factor(query: &Embedding, embedding: &Embedding) -> f64 {
    f64::from(query.cosine_similarity(embedding))
}

/// Min-max normalise a series into `[0, 1]`; a flat series maps to 0.5.
#[must_use]
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if values.is_empty() || range <= 0.0 || !range.is_finite() {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| ((v - min) / range).clamp(0.0, 1.0)).collect()
}

/// A candidate's position in the scored slice together with its score.
#[derive(Debug, Clone, Copy)]
pub struct RankedCandidate {
    /// Index into the slice that was ranked.
    pub position: usize,
    /// Weighted total.
    pub score: RetrievalScore,
    /// Weighted, normalised per-factor contributions.
    pub breakdown: ScoreBreakdown,
}

/// Score and order every record in `candidates`, best first.
///
/// Ties on score are broken by `created_at` descending, then by id
/// descending, so ranking is fully deterministic.
#[must_use]
pub fn rank_candidates(
    candidates: &[MemoryRecord],
    query: &Embedding,
    now: Timestamp,
    weights: &RetrievalWeights,
    recency_decay: f64,
) -> Vec<RankedCandidate> {
    let recency: Vec<f64> = candidates
        .iter()
        .map(|r| recency_factor(r.hours_since_access(now), recency_decay))
        .collect();
    let importance: Vec<f64> = candidates.iter().map(|r| f64::from(r.importance)).collect();
    let relevance: Vec<f64> = candidates
        .iter()
        .map(|r| relevance_factor(query, &r.embedding))
        .collect();

    let recency = min_max_normalize(&recency);
    let importance = min_max_normalize(&importance);
    let relevance = min_max_normalize(&relevance);

    let mut ranked: Vec<RankedCandidate> = (0..candidates.len())
        .map(|i| {
            let breakdown = ScoreBreakdown {
                recency: weights.recency * recency[i],
                importance: weights.importance * importance[i],
                relevance: weights.relevance * relevance[i],
            };
            RankedCandidate {
                position: i,
                score: RetrievalScore::new(breakdown.total()),
                breakdown,
            }
        })
        .collect();

    ranked.sort_by(|a, b| compare_ranked(candidates, a, b));
    ranked
}

fn compare_ranked(
    candidates: &[MemoryRecord],
    a: &RankedCandidate,
    b: &RankedCandidate,
) -> Ordering {
    let (ra, rb) = (&candidates[a.position], &candidates[b.position]);
    b.score
        .cmp(&a.score)
        .then_with(|| rb.created_at.cmp(&ra.created_at))
        .then_with(|| rb.id.cmp(&ra.id))
}
