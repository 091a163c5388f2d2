//! Queued mutation model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{ConflictPolicy, EntityKind, Operation};

/// A unique identifier for a queued mutation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Create a new unique queue item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Whether an item is eligible for the next sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    #[default]
    Pending,
    /// Waiting for a manual resolution; never picked by a sync cycle
    Conflicted,
}

/// One pending local mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub operation: Operation,
    /// Opaque payload handed to the transport
    pub data: Value,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Higher is sooner
    pub priority: i32,
    pub retry_count: u32,
    /// Overrides the configured default policy
    #[serde(default)]
    pub policy: Option<ConflictPolicy>,
    /// Device that authored the mutation
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub status: QueueItemStatus,
    /// Remote must overwrite without a conflict check
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Bumped whenever a later mutation is coalesced into this item
    #[serde(default)]
    pub revision: u32,
}

impl QueueItem {
    pub fn is_pending(&self) -> bool {
        self.status == QueueItemStatus::Pending
    }

    pub fn is_conflicted(&self) -> bool {
        self.status == QueueItemStatus::Conflicted
    }
}

/// A mutation before it has been accepted by the queue.
///
/// `id` and `created_at` are assigned on enqueue when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
    pub id: Option<QueueItemId>,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub operation: Operation,
    pub data: Value,
    pub created_at: Option<i64>,
    pub priority: i32,
    pub policy: Option<ConflictPolicy>,
    pub device_id: Option<String>,
    pub force: bool,
    pub idempotency_key: Option<String>,
}

impl NewMutation {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        data: Value,
    ) -> Self {
        Self {
            id: None,
            entity_kind,
            entity_id: entity_id.into(),
            operation,
            data,
            created_at: None,
            priority: 0,
            policy: None,
            device_id: None,
            force: false,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub const fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    #[must_use]
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Fill in missing identity fields and produce a queue item.
    pub fn into_item(self, now: i64) -> QueueItem {
        QueueItem {
            id: self.id.unwrap_or_default(),
            entity_kind: self.entity_kind,
            entity_id: self.entity_id,
            operation: self.operation,
            data: self.data,
            created_at: self.created_at.unwrap_or(now),
            priority: self.priority,
            retry_count: 0,
            policy: self.policy,
            device_id: self.device_id,
            status: QueueItemStatus::Pending,
            force: self.force,
            idempotency_key: self.idempotency_key,
            revision: 0,
        }
    }
}
