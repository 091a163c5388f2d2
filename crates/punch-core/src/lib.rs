//! punch-core - Offline-first sync core for Punch
//!
//! This crate contains the durable mutation queue, conflict resolution, the
//! sync orchestrator and the background work timer shared by every Punch
//! host (CLI, desktop, mobile).

pub mod config;
pub mod conflict;
pub mod device;
pub mod engine;
pub mod error;
pub mod models;
pub mod platform;
pub mod queue;
pub mod storage;
pub mod sync;
pub mod timer;
pub mod util;

pub use config::{SyncConfig, TimerConfig};
pub use device::DeviceIdentity;
pub use engine::{PunchCore, PunchCoreBuilder};
pub use error::{Error, Result};
pub use models::{
    BackgroundTimerState, ConflictPolicy, EntityKind, NewMutation, Operation, QueueItem,
    QueueItemId, RemoteRecord, TimerPhase,
};
pub use queue::{DurableQueue, QueueStatus};
pub use sync::{ApplyOutcome, RemoteTransport, SyncReport, SyncStatus};
pub use timer::{CompletedInterval, HeartbeatStatus};
