//! Configuration for the Reverie agent system.
//!
//! Maps directly to `reverie.toml`. Every section and field is defaulted so a
//! partial (or empty) file is valid. The value is passed into constructors;
//! nothing reads configuration from ambient global state.

use serde::{Deserialize, Serialize};

/// Top-level Reverie configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverieConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Memory record / log settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Retrieval algorithm settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Reflection trigger and pipeline sizing.
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Reaction decision and anti-repetition guard.
    #[serde(default)]
    pub reaction: ReactionConfig,
    /// Multi-agent conversation session.
    #[serde(default)]
    pub session: SessionConfig,
    /// LLM integration settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ReverieConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ReverieError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::ReverieError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Output language for generated dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    /// English.
    #[default]
    #[serde(rename = "en")]
    English,
    /// Korean.
    #[serde(rename = "ko")]
    Korean,
}

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Language agents speak in.
    #[serde(default)]
    pub language: Language,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            language: Language::default(),
        }
    }
}

/// Per-agent memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Embedding vector dimension, validated on every write and query.
    #[serde(default = "default_1024")]
    pub embedding_dimension: usize,
    /// Importance used when the scorer fails or times out.
    #[serde(default = "default_3_i32")]
    pub fallback_importance: i32,
    /// Budget for any single collaborator call in milliseconds.
    #[serde(default = "default_30000")]
    pub collaborator_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 1024,
            fallback_importance: 3,
            collaborator_timeout_ms: 30_000,
        }
    }
}

/// Memory retrieval algorithm settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of memories retrieved per query.
    #[serde(default = "default_3_usize")]
    pub top_k: usize,
    /// Per-hour recency decay base.
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
    /// Retrieval weight tuning.
    #[serde(default)]
    pub weights: RetrievalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            recency_decay: 0.995,
            weights: RetrievalWeights::default(),
        }
    }
}

/// Retrieval scoring weights (α, β, γ). With the defaults a score spans `[0, 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalWeights {
    /// α: weight for normalised recency.
    #[serde(default = "default_1_0")]
    pub recency: f64,
    /// β: weight for normalised importance.
    #[serde(default = "default_1_0")]
    pub importance: f64,
    /// γ: weight for normalised relevance.
    #[serde(default = "default_1_0")]
    pub relevance: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            importance: 1.0,
            relevance: 1.0,
        }
    }
}

/// Which rollover policy the reflection pipeline applies after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverKind {
    /// Counter returns to zero.
    Reset,
    /// Counter keeps whatever exceeded the threshold.
    #[default]
    CarryExcess,
}

/// Reflection trigger and pipeline sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Accumulated importance at which a reflection run fires.
    #[serde(default = "default_150")]
    pub threshold: i64,
    /// How many of the most recent records feed question generation.
    #[serde(default = "default_100")]
    pub recent_window: usize,
    /// Questions requested per run.
    #[serde(default = "default_3_usize")]
    pub question_count: usize,
    /// Insights requested per run.
    #[serde(default = "default_5_usize")]
    pub insight_count: usize,
    /// Evidence records retrieved per question.
    #[serde(default = "default_5_usize")]
    pub retrieval_top_k: usize,
    /// Post-run counter policy.
    #[serde(default)]
    pub rollover: RolloverKind,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            threshold: 150,
            recent_window: 100,
            question_count: 3,
            insight_count: 5,
            retrieval_top_k: 5,
            rollover: RolloverKind::default(),
        }
    }
}

/// Reaction decision and anti-repetition guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionConfig {
    /// Retries after a repetitive candidate (total calls = retries + 1).
    #[serde(default = "default_2_u32")]
    pub max_retries: u32,
    /// N-gram size for the overlap check.
    #[serde(default = "default_2_usize")]
    pub overlap_ngram: usize,
    /// Candidate is rejected when overlap with any recent sentence exceeds this.
    #[serde(default = "default_0_5")]
    pub overlap_threshold: f64,
    /// How many recent dialogue sentences the guard compares against.
    #[serde(default = "default_3_usize")]
    pub recent_sentence_window: usize,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            overlap_ngram: 2,
            overlap_threshold: 0.5,
            recent_sentence_window: 3,
        }
    }
}

/// Conversation session settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of turn pairs shown to a speaker; unbounded when unset.
    #[serde(default)]
    pub dialogue_window: Option<usize>,
    /// Shared scene description handed to every Perceive phase.
    #[serde(default)]
    pub world_context: Option<String>,
    /// Utterance used when a tick fails; the speaker stays silent when unset.
    #[serde(default)]
    pub fallback_utterance: Option<String>,
}

/// LLM provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Ollama running locally.
    #[default]
    Ollama,
    /// OpenAI-compatible HTTP API.
    #[serde(rename = "openai")]
    OpenAiCompatible,
    /// No backend; every call fails and callers degrade.
    None,
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which backend to talk to.
    #[serde(default)]
    pub provider: ProviderKind,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model used for generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model used for embeddings.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Transport-level retries per request.
    #[serde(default = "default_1_u32")]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Nucleus sampling.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Max tokens to generate.
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    /// Optional repeat penalty.
    #[serde(default)]
    pub repeat_penalty: Option<f32>,
    /// Optional presence penalty.
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    /// Optional frequency penalty.
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_ollama_url(),
            api_key: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            max_retries: 1,
            temperature: 0.0,
            top_p: 0.9,
            num_predict: 80,
            repeat_penalty: None,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { wal_mode: true }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_chat_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_embedding_model() -> String { "bge-m3".to_string() }
fn default_recency_decay() -> f64 { 0.995 }
fn default_top_p() -> f32 { 0.9 }
fn default_0_5() -> f64 { 0.5 }
fn default_1_0() -> f64 { 1.0 }
fn default_1_u32() -> u32 { 1 }
fn default_2_u32() -> u32 { 2 }
fn default_2_usize() -> usize { 2 }
fn default_3_i32() -> i32 { 3 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_num_predict() -> u32 { 80 }
fn default_100() -> usize { 100 }
fn default_150() -> i64 { 150 }
fn default_1024() -> usize { 1024 }
fn default_30000() -> u64 { 30_000 }
