//! Error types for the Reverie core library.

use thiserror::Error;

/// Top-level error type for all Reverie operations.
#[derive(Error, Debug)]
pub enum ReverieError {
    /// An embedding did not have the configured dimension.
    ///
    /// Structural: the write that carried it is aborted.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension for this deployment.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// Persona / profile data is malformed; agent initialisation is aborted.
    #[error("Invalid agent profile: {0}")]
    InvalidProfile(String),

    /// A conversation session was constructed with an invalid shape.
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// A session operation named an agent it does not know.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// A collaborator (encoder, scorer, decider, reflection stage) failed.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// A collaborator call exceeded its time budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Which call timed out.
        operation: String,
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReverieError {
    /// Whether the failure is recoverable at tick level (collaborator trouble)
    /// rather than a programmer / configuration error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Collaborator(_) | Self::Timeout { .. })
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReverieError>;
