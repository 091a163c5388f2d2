//! Remote application seam supplied by the host

use async_trait::async_trait;

use crate::models::{QueueItem, RemoteRecord};

/// Classified result of one remote application attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Remote accepted the mutation
    Applied,
    /// Remote target changed since the mutation was authored
    Conflict(RemoteRecord),
    /// Recoverable failure (network, timeout, server busy)
    TransientError(String),
}

/// Opaque request/response call to the remote store.
///
/// Implementations must apply items with `force` set unconditionally,
/// without a conflict check.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn apply(&self, item: &QueueItem) -> ApplyOutcome;
}

/// Transport for hosts with no remote configured; every attempt is transient
/// so items stay queued until a real transport is plugged in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedTransport;

#[async_trait]
impl RemoteTransport for DisconnectedTransport {
    async fn apply(&self, _item: &QueueItem) -> ApplyOutcome {
        ApplyOutcome::TransientError("no remote transport configured".to_string())
    }
}
