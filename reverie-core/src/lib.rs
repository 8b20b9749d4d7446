//! # Reverie Core Library
//!
//! The memory substrate of a generative-agent cognition loop.
//!
//! Every agent owns a [`MemoryLog`]: an append-only stream of
//! [`MemoryRecord`]s (observations, reflections, plans) ranked for retrieval
//! by normalised recency, importance and relevance. On top of it sit:
//!
//! - [`MemoryService`]: turns raw text into scored, embedded records
//! - [`ReflectionPipeline`]: accumulates salience and synthesises
//!   higher-order reflections through replaceable stages
//! - collaborator traits ([`EmbeddingEncoder`], [`ImportanceScorer`],
//!   [`ReactionDecider`], the reflection stages) with deterministic
//!   in-memory implementations
//! - [`persistence::LogStore`]: an SQLite home for memory logs
//!
//! Network-backed collaborators live in `reverie-llm`; the per-agent tick
//! loop and the multi-agent session live in `reverie-agents`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dialogue;
pub mod embedding;
pub mod error;
pub mod importance;
pub mod memory;
pub mod persistence;
pub mod persona;
pub mod reaction;
pub mod reflection;
pub mod retrieval;
pub mod service;
pub mod text;
pub mod types;

pub use config::{Language, ReverieConfig};
pub use dialogue::DialogueTurn;
pub use embedding::{EmbeddingEncoder, HashingEmbeddingEncoder, StubEmbeddingEncoder};
pub use error::{ReverieError, Result};
pub use importance::{
    FixedImportanceScorer, ImportanceScorer, ObservationContext, ReflectionContext,
};
pub use memory::{MemoryLog, MemoryRecord};
pub use persona::{AgentIdentity, AgentProfile, ExtendedPersona, FixedPersona};
pub use reaction::{
    ReactionDecider, ReactionDecision, ReactionRequest, RepetitionGuard, ScriptedReactionDecider,
};
pub use reflection::{Insight, ReflectionPipeline, ReflectionStages};
pub use service::{MemoryService, SortOrder};
pub use types::*;
