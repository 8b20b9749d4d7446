//! # reverie-agents: the cognition loop and multi-agent sessions
//!
//! Builds on `reverie-core` (memory, retrieval, reflection) and
//! `reverie-llm` (model-backed collaborators):
//!
//! - [`AgentBrain`]: one agent's Perceive → Store → Reflect → Determine →
//!   React → Act tick
//! - [`ConversationSession`]: round-robin turns, per-agent dialogue windows
//!   and delivery queues
//! - [`factory`]: wiring brains from a [`SimulationConfig`]
//! - [`repetition`]: the n-gram overlap guard used by the React phase

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod brain;
pub mod config;
pub mod factory;
pub mod perception;
pub mod query;
pub mod repetition;
pub mod session;

pub use brain::{AgentBrain, TickInput, TickOutcome};
pub use config::{AgentSpec, RunConfig, SeedMemory, SimulationConfig};
pub use factory::{Collaborators, ReflectionBackend, build_agent};
pub use session::{ConversationSession, TurnRecord};
