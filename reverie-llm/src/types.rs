//! Core types for LLM requests and responses.

use reverie_core::config::LlmConfig;
use serde::{Deserialize, Serialize};

/// Sampling options sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Nucleus sampling.
    pub top_p: f32,
    /// Maximum tokens to generate.
    pub num_predict: u32,
    /// Optional repeat penalty.
    pub repeat_penalty: Option<f32>,
    /// Optional presence penalty.
    pub presence_penalty: Option<f32>,
    /// Optional frequency penalty.
    pub frequency_penalty: Option<f32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.9,
            num_predict: 80,
            repeat_penalty: None,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }
}

impl GenerateOptions {
    /// Options taken from the `[llm]` config section.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            num_predict: config.num_predict,
            repeat_penalty: config.repeat_penalty,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
        }
    }
}

/// A request to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// Optional system prompt.
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Ask the backend to constrain output to JSON.
    pub json_mode: bool,
    /// Sampling options.
    pub options: GenerateOptions,
}

impl LlmRequest {
    /// Plain-text request with default options.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            json_mode: false,
            options: GenerateOptions::default(),
        }
    }

    /// Attach a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Request JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Override sampling options.
    #[must_use]
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub text: String,
    /// Tokens generated, when the backend reports it.
    pub tokens_generated: u32,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Model that answered.
    pub model: String,
}
