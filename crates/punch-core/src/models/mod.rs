//! Data models for Punch

mod conflict;
mod entity;
mod queue_item;
mod timer;

pub use conflict::{ConflictPolicy, ConflictRecord, RemoteRecord};
pub use entity::{EntityKind, Operation};
pub use queue_item::{NewMutation, QueueItem, QueueItemId, QueueItemStatus};
pub use timer::{BackgroundTimerState, TimerPhase};
