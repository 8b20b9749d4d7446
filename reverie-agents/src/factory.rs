//! Wiring agents from configuration and collaborators.

use std::sync::Arc;

use reverie_core::ReverieConfig;
use reverie_core::config::ProviderKind;
use reverie_core::embedding::{EmbeddingEncoder, HashingEmbeddingEncoder};
use reverie_core::error::Result;
use reverie_core::importance::{FixedImportanceScorer, ImportanceScorer};
use reverie_core::persona::AgentProfile;
use reverie_core::reaction::{ReactionDecider, ScriptedReactionDecider};
use reverie_core::reflection::{ReflectionPipeline, ReflectionStages};
use reverie_core::service::MemoryService;
use reverie_llm::{
    GenerateOptions, LlmClient, LlmEmbeddingEncoder, LlmImportanceScorer, LlmReactionDecider,
    llm_reflection_stages,
};
use tracing::info;

use crate::brain::AgentBrain;

/// Where reflection stages come from. LLM stages hold per-run citation
/// state, so every agent gets its own set.
#[derive(Debug, Clone)]
pub enum ReflectionBackend {
    /// Template questions and insights, word-overlap citations.
    Heuristic,
    /// Model-generated questions, insights and citations.
    Llm {
        /// Shared client.
        client: Arc<LlmClient>,
        /// Sampling options.
        options: GenerateOptions,
    },
}

/// Collaborators shared by every agent in a run.
#[derive(Clone)]
pub struct Collaborators {
    /// Embedding encoder.
    pub encoder: Arc<dyn EmbeddingEncoder>,
    /// Importance scorer.
    pub scorer: Arc<dyn ImportanceScorer>,
    /// Reaction decider.
    pub decider: Arc<dyn ReactionDecider>,
    /// Reflection stage source.
    pub reflection: ReflectionBackend,
}

impl Collaborators {
    /// Model-free collaborators: hashing embeddings, a fixed importance and
    /// `decider` for reactions.
    #[must_use]
    pub fn offline(config: &ReverieConfig, decider: Arc<dyn ReactionDecider>) -> Self {
        Self {
            encoder: Arc::new(HashingEmbeddingEncoder::new(config.memory.embedding_dimension)),
            scorer: Arc::new(FixedImportanceScorer::new(i64::from(
                config.memory.fallback_importance,
            ))),
            decider,
            reflection: ReflectionBackend::Heuristic,
        }
    }

    /// Collaborators for the configured `[llm]` provider. With provider
    /// `none` this is [`Collaborators::offline`] with a decider that always
    /// stays silent.
    ///
    /// # Errors
    /// Invalid LLM configuration.
    pub fn from_config(config: &ReverieConfig) -> Result<Self> {
        if config.llm.provider == ProviderKind::None {
            info!("No LLM provider configured, using offline collaborators");
            return Ok(Self::offline(
                config,
                Arc::new(ScriptedReactionDecider::new(Vec::new())),
            ));
        }
        let client = Arc::new(
            LlmClient::from_config(&config.llm)?
                .with_timeout_ms(config.memory.collaborator_timeout_ms),
        );
        let options = GenerateOptions::from_config(&config.llm);
        info!(client = ?client, "LLM collaborators ready");
        Ok(Self {
            encoder: Arc::new(LlmEmbeddingEncoder::new(
                Arc::clone(&client),
                config.memory.embedding_dimension,
            )),
            scorer: Arc::new(LlmImportanceScorer::new(Arc::clone(&client), options)),
            decider: Arc::new(LlmReactionDecider::new(Arc::clone(&client), options)),
            reflection: ReflectionBackend::Llm { client, options },
        })
    }

    /// A fresh set of reflection stages for one agent.
    #[must_use]
    pub fn reflection_stages(&self, config: &ReverieConfig) -> ReflectionStages {
        match &self.reflection {
            ReflectionBackend::Heuristic => {
                ReflectionStages::heuristic(Arc::clone(&self.encoder), &config.retrieval)
            }
            ReflectionBackend::Llm { client, options } => llm_reflection_stages(
                Arc::clone(client),
                *options,
                Arc::clone(&self.encoder),
                &config.retrieval,
            ),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("encoder", &self.encoder.model_name())
            .field("reflection", &self.reflection)
            .finish_non_exhaustive()
    }
}

/// Build one agent's brain.
#[must_use]
pub fn build_agent(
    profile: AgentProfile,
    config: &ReverieConfig,
    collaborators: &Collaborators,
) -> AgentBrain {
    let memory = MemoryService::new(
        config,
        Arc::clone(&collaborators.scorer),
        Arc::clone(&collaborators.encoder),
    );
    let reflection = ReflectionPipeline::new(
        config.reflection.clone(),
        collaborators.reflection_stages(config),
    );
    AgentBrain::new(
        profile,
        memory,
        reflection,
        Arc::clone(&collaborators.decider),
        config.reaction.clone(),
        config.retrieval.top_k,
        config.general.language,
    )
}
