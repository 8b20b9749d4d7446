//! # reverie-llm: model-backed collaborators for Reverie
//!
//! A single [`LlmClient`] talks to either backend:
//!   - **Ollama** (`/api/generate`, `/api/embed`), the default
//!   - **OpenAI-compatible** (`/v1/chat/completions`, `/v1/embeddings`)
//!
//! On top of it sit implementations of every `reverie-core` collaborator
//! trait: [`LlmEmbeddingEncoder`], [`LlmImportanceScorer`],
//! [`LlmReactionDecider`] and the reflection stages in [`reflection`].
//! Parsers are lenient: malformed model output degrades to empty or
//! default results, while transport failures surface as errors the core
//! already knows how to absorb.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod embedding;
pub mod error;
pub mod importance;
pub mod parse;
pub mod prompt;
pub mod reaction;
pub mod reflection;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use embedding::LlmEmbeddingEncoder;
pub use error::LlmError;
pub use importance::LlmImportanceScorer;
pub use reaction::LlmReactionDecider;
pub use reflection::{LlmReflector, llm_reflection_stages};
pub use types::{GenerateOptions, LlmRequest, LlmResponse};
