use std::io;

use thiserror::Error;

use crate::http_transport::TransportError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] punch_core::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Queue item not found for id/prefix: {0}")]
    QueueItemNotFound(String),
    #[error("{0}")]
    AmbiguousQueueItemId(String),
    #[error("Queue item ID cannot be empty")]
    EmptyQueueItemId,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `punch config init --endpoint <url>`, pass --endpoint, or set PUNCH_SYNC_ENDPOINT."
    )]
    SyncNotConfigured,
}
