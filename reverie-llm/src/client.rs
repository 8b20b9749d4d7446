//! LLM client: one interface over Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use reverie_core::config::{LlmConfig, ProviderKind};
use reverie_core::types::Embedding;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{GenerateOptions, LlmRequest, LlmResponse};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// Server root without the `/v1` suffix.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available: every call fails and callers degrade.
    None,
}

/// Routes generation and embedding requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    chat_model: String,
    embedding_model: String,
    max_retries: u32,
    timeout_ms: u64,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            max_retries,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Create a client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, "", "", 0)
    }

    /// Build a client from the `[llm]` config section.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] when the OpenAI-compatible
    /// provider is selected without an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider = match config.provider {
            ProviderKind::Ollama => LlmProvider::Ollama { base_url },
            ProviderKind::OpenAiCompatible => {
                let api_key = config
                    .api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        LlmError::ConfigError("openai provider requires llm.api_key".into())
                    })?;
                LlmProvider::OpenAiCompatible { base_url, api_key }
            }
            ProviderKind::None => LlmProvider::None,
        };
        Ok(Self::new(
            provider,
            config.chat_model.clone(),
            config.embedding_model.clone(),
            config.max_retries,
        ))
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The configured backend.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Model used for generation.
    #[must_use]
    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    /// Model used for embeddings.
    #[must_use]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Whether any backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a completion.
    ///
    /// # Errors
    /// Returns `Err` if no backend is configured, every attempt fails, or
    /// the response lacks the generated text.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    /// Embed `text`, checking the result has `expected_dim` components.
    ///
    /// # Errors
    /// Transport failures, a missing vector, or
    /// [`LlmError::DimensionMismatch`].
    pub async fn embed(&self, text: &str, expected_dim: usize) -> Result<Embedding, LlmError> {
        let start = Instant::now();
        let vector = match &self.provider {
            LlmProvider::None => {
                return Err(LlmError::Unavailable("No LLM provider configured".into()));
            }
            LlmProvider::Ollama { base_url } => {
                let body = json!({
                    "model": self.embedding_model,
                    "input": text,
                    "truncate": true,
                    "keep_alive": "30m",
                    "dimensions": expected_dim,
                });
                let json = self
                    .post_json(&format!("{base_url}/api/embed"), &body, None)
                    .await?;
                let first = json
                    .get("embeddings")
                    .and_then(Value::as_array)
                    .and_then(|rows| rows.first())
                    .or_else(|| json.get("embedding"));
                parse_vector(first)?
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let body = json!({
                    "model": self.embedding_model,
                    "input": text,
                    "dimensions": expected_dim,
                });
                let json = self
                    .post_json(&format!("{base_url}/v1/embeddings"), &body, Some(api_key))
                    .await?;
                parse_vector(json.pointer("/data/0/embedding"))?
            }
        };

        if vector.len() != expected_dim {
            return Err(LlmError::DimensionMismatch {
                expected: expected_dim,
                actual: vector.len(),
            });
        }
        debug!(
            model = %self.embedding_model,
            dims = vector.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Embedding computed"
        );
        Ok(Embedding(vector))
    }

    /// Generate using Ollama's `/api/generate`.
    async fn generate_ollama(
        &self,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let mut body = json!({
            "model": self.chat_model,
            "prompt": request.prompt,
            "stream": false,
            "options": ollama_options(&request.options),
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if request.json_mode {
            body["format"] = json!("json");
        }

        let start = Instant::now();
        let json = self
            .post_json(&format!("{base_url}/api/generate"), &body, None)
            .await?;
        let text = json
            .get("response")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::ParseError("missing `response` field".into()))?;

        Ok(LlmResponse {
            text: text.to_string(),
            tokens_generated: json
                .get("eval_count")
                .and_then(Value::as_u64)
                .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX)),
            latency_ms: elapsed_ms(start),
            model: self.chat_model.clone(),
        })
    }

    /// Generate using an OpenAI-compatible `/v1/chat/completions`.
    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let opts = &request.options;
        let mut body = json!({
            "model": self.chat_model,
            "messages": messages,
            "max_tokens": opts.num_predict,
            "temperature": opts.temperature,
            "top_p": opts.top_p,
        });
        if let Some(p) = opts.presence_penalty {
            body["presence_penalty"] = json!(p);
        }
        if let Some(p) = opts.frequency_penalty {
            body["frequency_penalty"] = json!(p);
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let start = Instant::now();
        let json = self
            .post_json(
                &format!("{base_url}/v1/chat/completions"),
                &body,
                Some(api_key),
            )
            .await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::ParseError("missing `choices[0].message.content`".into()))?;

        Ok(LlmResponse {
            text: text.to_string(),
            tokens_generated: json
                .pointer("/usage/completion_tokens")
                .and_then(Value::as_u64)
                .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX)),
            latency_ms: elapsed_ms(start),
            model: self.chat_model.clone(),
        })
    }

    /// POST `body` and decode a JSON reply, retrying transport and HTTP
    /// failures up to `max_retries` times.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<Value, LlmError> {
        let mut last_error = String::new();
        let mut timed_out = false;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    url,
                    "Retrying LLM call (attempt {}/{})",
                    attempt + 1,
                    self.max_retries + 1
                );
            }

            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(self.timeout_ms));
            if let Some(key) = bearer {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    last_error = format!("HTTP {status}: {body}");
                    timed_out = false;
                    warn!(url, "LLM backend returned error: {}", last_error);
                }
                Err(e) => {
                    last_error = e.to_string();
                    timed_out = e.is_timeout();
                    if timed_out {
                        warn!(url, "LLM request timed out after {}ms", self.timeout_ms);
                    } else {
                        warn!(url, "LLM request failed: {}", last_error);
                    }
                }
            }
        }

        if timed_out {
            return Err(LlmError::Timeout(self.timeout_ms));
        }
        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match &self.provider {
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::OpenAiCompatible { .. } => "openai",
            LlmProvider::None => "none",
        };
        f.debug_struct("LlmClient")
            .field("provider", &provider)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

fn ollama_options(opts: &GenerateOptions) -> Value {
    let mut options = json!({
        "temperature": opts.temperature,
        "top_p": opts.top_p,
        "num_predict": opts.num_predict,
    });
    if let Some(p) = opts.repeat_penalty {
        options["repeat_penalty"] = json!(p);
    }
    if let Some(p) = opts.presence_penalty {
        options["presence_penalty"] = json!(p);
    }
    if let Some(p) = opts.frequency_penalty {
        options["frequency_penalty"] = json!(p);
    }
    options
}

#[allow(clippy::cast_possible_truncation)]
fn parse_vector(value: Option<&Value>) -> Result<Vec<f32>, LlmError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::ParseError("response carries no embedding".into()))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| LlmError::ParseError("non-numeric embedding component".into()))
        })
        .collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
