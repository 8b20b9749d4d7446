//! Embedding encoder backed by the LLM client.

use std::sync::Arc;

use async_trait::async_trait;
use reverie_core::embedding::EmbeddingEncoder;
use reverie_core::error::Result;
use reverie_core::types::Embedding;

use crate::client::LlmClient;

/// Encodes text through the configured embedding endpoint.
#[derive(Debug, Clone)]
pub struct LlmEmbeddingEncoder {
    client: Arc<LlmClient>,
    dimension: usize,
}

impl LlmEmbeddingEncoder {
    /// Encoder that expects `dimension`-long vectors from `client`.
    #[must_use]
    pub fn new(client: Arc<LlmClient>, dimension: usize) -> Self {
        Self { client, dimension }
    }
}

#[async_trait]
impl EmbeddingEncoder for LlmEmbeddingEncoder {
    async fn encode(&self, text: &str) -> Result<Embedding> {
        Ok(self.client.embed(text, self.dimension).await?)
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        self.client.embedding_model()
    }
}
