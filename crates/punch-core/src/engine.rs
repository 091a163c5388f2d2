//! `PunchCore`: one explicit instance wiring storage, queue, sync and timer.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{SyncConfig, TimerConfig};
use crate::device::DeviceIdentity;
use crate::error::{Error, Result};
use crate::models::{
    BackgroundTimerState, EntityKind, NewMutation, Operation, QueueItem, QueueItemId,
};
use crate::platform::{Clock, NoWakeLock, SystemClock, WakeLock};
use crate::queue::{DurableQueue, QueueStatus};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};
use crate::sync::{
    DisconnectedTransport, RemoteTransport, SchedulerHandle, SyncOrchestrator, SyncReport,
};
use crate::timer::{BackgroundTimerAgent, CompletedInterval, HeartbeatStatus};

/// Dependencies for [`PunchCore`]; everything but the store has a default.
pub struct PunchCoreBuilder {
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn RemoteTransport>,
    clock: Arc<dyn Clock>,
    wake_lock: Arc<dyn WakeLock>,
    sync_config: SyncConfig,
    timer_config: TimerConfig,
}

impl PunchCoreBuilder {
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_wake_lock(mut self, wake_lock: Arc<dyn WakeLock>) -> Self {
        self.wake_lock = wake_lock;
        self
    }

    #[must_use]
    pub fn with_sync_config(mut self, config: SyncConfig) -> Self {
        self.sync_config = config;
        self
    }

    #[must_use]
    pub fn with_timer_config(mut self, config: TimerConfig) -> Self {
        self.timer_config = config;
        self
    }

    /// Load device id, queue and any persisted timer, then wire components.
    pub async fn open(self) -> Result<PunchCore> {
        self.sync_config.validate()?;
        self.timer_config.validate()?;

        let device = DeviceIdentity::get_or_create(self.store.as_ref()).await?;
        let queue =
            Arc::new(DurableQueue::load(Arc::clone(&self.store), Arc::clone(&self.clock)).await?);
        let sync = Arc::new(SyncOrchestrator::new(
            Arc::clone(&queue),
            self.transport,
            self.sync_config,
            Some(device.as_str().to_string()),
        ));
        let timer = Arc::new(BackgroundTimerAgent::new(
            Arc::clone(&self.store),
            Arc::clone(&queue),
            self.clock,
            self.wake_lock,
            Some(device.as_str().to_string()),
            self.timer_config,
        ));
        timer.restore().await?;

        tracing::info!("Punch core ready on device {device}");
        Ok(PunchCore {
            device,
            queue,
            sync,
            timer,
        })
    }
}

/// Thread-safe handle to the sync core; clones share the same state.
#[derive(Clone)]
pub struct PunchCore {
    device: DeviceIdentity,
    queue: Arc<DurableQueue>,
    sync: Arc<SyncOrchestrator>,
    timer: Arc<BackgroundTimerAgent>,
}

impl PunchCore {
    pub fn builder(store: Arc<dyn KeyValueStore>) -> PunchCoreBuilder {
        PunchCoreBuilder {
            store,
            transport: Arc::new(DisconnectedTransport),
            clock: Arc::new(SystemClock),
            wake_lock: Arc::new(NoWakeLock),
            sync_config: SyncConfig::default(),
            timer_config: TimerConfig::default(),
        }
    }

    /// Open a core persisted in a SQLite file at `db_path`.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        transport: Arc<dyn RemoteTransport>,
        sync_config: SyncConfig,
    ) -> Result<Self> {
        let store = SqliteStore::open(db_path.into())?;
        Self::builder(Arc::new(store))
            .with_transport(transport)
            .with_sync_config(sync_config)
            .open()
            .await
    }

    /// Open a core that forgets everything on drop (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Self::builder(Arc::new(MemoryStore::new())).open().await
    }

    pub fn device_id(&self) -> &str {
        self.device.as_str()
    }

    /// Queue a mutation tagged with this device and trigger auto-sync.
    pub async fn add_to_queue(
        &self,
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        data: Value,
        priority: i32,
    ) -> Result<QueueItem> {
        self.enqueue(NewMutation::new(entity_kind, entity_id, operation, data).with_priority(priority))
            .await
    }

    /// Queue a fully specified mutation; untagged mutations get this device id.
    pub async fn enqueue(&self, mut mutation: NewMutation) -> Result<QueueItem> {
        if mutation.entity_id.trim().is_empty() {
            return Err(Error::InvalidInput("entity id must not be empty".to_string()));
        }
        if mutation.device_id.is_none() {
            mutation.device_id = Some(self.device.as_str().to_string());
        }

        let item = self.queue.enqueue(mutation).await?;
        self.sync.notify_enqueued();
        Ok(item)
    }

    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.sync.sync_now().await
    }

    pub async fn queue_status(&self) -> QueueStatus {
        self.queue.status().await
    }

    pub async fn queue_items(&self) -> Vec<QueueItem> {
        self.queue.items().await
    }

    /// Items parked for a manual conflict decision
    pub async fn conflicts(&self) -> Vec<QueueItem> {
        self.queue.conflicts().await
    }

    /// Settle a parked conflict with the chosen payload; the item is pushed
    /// with `force` on the next cycle.
    pub async fn resolve_conflict(&self, id: &QueueItemId, data: Value) -> Result<QueueItem> {
        let item = self.queue.resolve_conflicted(id, data).await?;
        tracing::info!("Conflict on {} {} resolved manually", item.entity_kind, item.entity_id);
        self.sync.notify_enqueued();
        Ok(item)
    }

    /// Drop a parked conflict, keeping whatever the remote has.
    pub async fn discard_conflict(&self, id: &QueueItemId) -> Result<QueueItem> {
        let removed = self.queue.discard(id).await?;
        tracing::info!(
            "Discarded conflicted {} {}",
            removed.entity_kind,
            removed.entity_id
        );
        Ok(removed)
    }

    /// Forward a connectivity notification; returns whether a reconnect sync
    /// was started.
    pub fn set_online(&self, online: bool) -> bool {
        self.sync.set_online(online).is_some()
    }

    pub fn is_online(&self) -> bool {
        self.sync.is_online()
    }

    pub fn config(&self) -> SyncConfig {
        self.sync.config()
    }

    pub fn replace_config(&self, config: SyncConfig) -> Result<()> {
        self.sync.replace_config(config)
    }

    /// Start the interval trigger; it stops when the handle is dropped.
    pub fn spawn_scheduler(&self) -> SchedulerHandle {
        self.sync.spawn_scheduler()
    }

    pub async fn start_timer(
        &self,
        project_id: &str,
        task_id: Option<&str>,
        employee_id: &str,
        battery_optimized: bool,
    ) -> Result<BackgroundTimerState> {
        let queued_before = self.queue.len().await;
        let state = self
            .timer
            .start(project_id, task_id, employee_id, battery_optimized)
            .await?;
        if self.queue.len().await > queued_before {
            self.sync.notify_enqueued();
        }
        Ok(state)
    }

    pub async fn pause_timer(&self) -> Result<BackgroundTimerState> {
        self.timer.pause().await
    }

    pub async fn resume_timer(&self) -> Result<BackgroundTimerState> {
        self.timer.resume().await
    }

    /// Stop the timer and queue the completed interval
    pub async fn stop_timer(&self) -> Result<CompletedInterval> {
        let completed = self.timer.stop().await?;
        self.sync.notify_enqueued();
        Ok(completed)
    }

    pub async fn timer_state(&self) -> Option<BackgroundTimerState> {
        self.timer.state().await
    }

    pub async fn heartbeat_status(&self) -> HeartbeatStatus {
        self.timer.heartbeat_status().await
    }
}
