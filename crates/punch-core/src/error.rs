//! Error types for punch-core

use thiserror::Error;

/// Result type alias using punch-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in punch-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Durable storage could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Queue item or persisted record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timer operation is not valid in the current state
    #[error("Invalid timer transition: {0}")]
    InvalidTransition(String),

    /// Optional platform capability is missing (e.g. wake-lock)
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

impl Error {
    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Whether this error means the durable record may disagree with memory.
    pub const fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Sqlite(_) | Self::Serialization(_)
        )
    }
}
