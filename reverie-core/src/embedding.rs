//! Text embedding abstraction.
//!
//! The memory service and reflection stages only ever see the
//! [`EmbeddingEncoder`] trait. Network-backed encoders live in
//! `reverie-llm`; the two deterministic encoders here serve tests and
//! model-free runs.

use async_trait::async_trait;

use crate::error::Result;
use crate::text::word_tokens;
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Turn text into fixed-length vectors.
///
/// Implementations must be `Send + Sync` so one encoder can be shared by
/// every agent in a session.
#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReverieError::Collaborator`] if the backend fails.
    /// Callers validate the returned dimension themselves.
    async fn encode(&self, text: &str) -> Result<Embedding>;

    /// The dimensionality of embeddings produced by this encoder.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Stub encoder
// ---------------------------------------------------------------------------

/// Returns zero vectors. Every relevance score against it is 0.
#[derive(Debug, Clone)]
pub struct StubEmbeddingEncoder {
    dims: usize,
}

impl StubEmbeddingEncoder {
    /// Create a stub encoder with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

#[async_trait]
impl EmbeddingEncoder for StubEmbeddingEncoder {
    async fn encode(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding::zeros(self.dims))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub-zero-vector"
    }
}

// ---------------------------------------------------------------------------
// Feature-hashing encoder
// ---------------------------------------------------------------------------

/// Deterministic bag-of-words encoder.
///
/// Each lowercase word token is hashed (FNV-1a) into one bucket with a
/// hash-derived sign, and the result is L2-normalised. Texts sharing words
/// get positive cosine similarity, which is enough for meaningful ranking in
/// tests and offline simulations.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingEncoder {
    dims: usize,
}

impl HashingEmbeddingEncoder {
    /// Create a hashing encoder with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }

    /// Synchronous embedding; the async trait method delegates here.
    #[must_use]
    pub fn embed_now(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0_f32; self.dims];
        if self.dims == 0 {
            return Embedding(vector);
        }
        for token in word_tokens(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = usize::try_from(hash % self.dims as u64).unwrap_or(0);
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Embedding(vector)
    }
}

#[async_trait]
impl EmbeddingEncoder for HashingEmbeddingEncoder {
    async fn encode(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed_now(text))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "fnv-feature-hashing"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_returns_zero_vector() {
        let encoder = StubEmbeddingEncoder::new(8);
        let e = encoder.encode("anything").await.expect("encode");
        assert_eq!(e.dimensions(), 8);
        assert!(e.0.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn hashing_is_deterministic_and_normalized() {
        let encoder = HashingEmbeddingEncoder::new(64);
        let a = encoder.encode("the bakery opens early").await.expect("encode");
        let b = encoder.encode("The bakery opens early!").await.expect("encode");
        assert_eq!(a, b);
        let norm: f32 = a.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_raise_similarity() {
        let encoder = HashingEmbeddingEncoder::new(256);
        let query = encoder.embed_now("valentine party at the cafe");
        let close = encoder.embed_now("planning a valentine party");
        let far = encoder.embed_now("repairing the old bicycle");
        assert!(query.cosine_similarity(&close) > query.cosine_similarity(&far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let encoder = HashingEmbeddingEncoder::new(16);
        assert!(encoder.embed_now("   ").0.iter().all(|x| *x == 0.0));
    }
}
