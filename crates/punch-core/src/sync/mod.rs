//! Sync orchestration: drains the durable queue against the remote store.
//!
//! At most one cycle runs at a time. A request made while a cycle is running
//! returns [`SyncStatus::AlreadyInProgress`] instead of queuing a second one.
//! Per-item failures are isolated; only queue persistence failures abort a
//! cycle.

mod scheduler;
mod transport;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::conflict::{build_conflict, resolve, Resolution};
use crate::error::Result;
use crate::models::{
    ConflictPolicy, EntityKind, NewMutation, QueueItem, QueueItemId, RemoteRecord,
};
use crate::queue::{Delivery, DurableQueue, RetryOutcome};

pub use scheduler::{backoff_seconds, SchedulerHandle};
pub use transport::{ApplyOutcome, DisconnectedTransport, RemoteTransport};

/// Why a cycle did or did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    AlreadyInProgress,
    Offline,
}

/// How a conflict was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Local payload re-queued as a forced update
    LocalKept,
    /// Remote payload kept; the host should adopt `winner`
    RemoteKept,
    /// Parked for a human decision
    AwaitingManual,
}

/// One conflict handled during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictResolution {
    pub item_id: QueueItemId,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub policy: ConflictPolicy,
    pub fields: Vec<String>,
    pub kind: ResolutionKind,
    pub winner: Option<Value>,
}

/// Aggregate outcome of one sync cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub synced: usize,
    pub errors: usize,
    pub conflicts: usize,
    /// Items dropped this cycle because they ran out of retries
    pub exhausted: Vec<QueueItem>,
    pub resolutions: Vec<ConflictResolution>,
}

impl SyncReport {
    const fn with_status(status: SyncStatus) -> Self {
        Self {
            status,
            synced: 0,
            errors: 0,
            conflicts: 0,
            exhausted: Vec::new(),
            resolutions: Vec::new(),
        }
    }

    pub const fn ran(&self) -> bool {
        matches!(self.status, SyncStatus::Completed)
    }
}

/// Clears the syncing flag on every exit path of a cycle
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    queue: Arc<DurableQueue>,
    transport: Arc<dyn RemoteTransport>,
    config: RwLock<SyncConfig>,
    device_id: Option<String>,
    syncing: AtomicBool,
    online: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl SyncOrchestrator {
    pub fn new(
        queue: Arc<DurableQueue>,
        transport: Arc<dyn RemoteTransport>,
        config: SyncConfig,
        device_id: Option<String>,
    ) -> Self {
        Self {
            queue,
            transport,
            config: RwLock::new(config),
            device_id,
            syncing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SyncConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the whole configuration; an in-flight cycle keeps its snapshot.
    pub fn replace_config(&self, config: SyncConfig) -> Result<()> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }

    /// Record a platform connectivity notification.
    ///
    /// An offline -> online transition starts a background cycle when
    /// `sync_on_reconnect` is set; the spawned task is returned.
    pub fn set_online(self: &Arc<Self>, online: bool) -> Option<JoinHandle<()>> {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        if was_online == online {
            return None;
        }

        tracing::info!(
            "Connectivity changed: {}",
            if online { "online" } else { "offline" }
        );
        if online && self.config().sync_on_reconnect {
            Some(self.spawn_cycle("reconnect"))
        } else {
            None
        }
    }

    /// Start a background cycle after an enqueue when auto-sync applies
    pub fn notify_enqueued(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.is_online() && self.config().auto_sync {
            Some(self.spawn_cycle("enqueue"))
        } else {
            None
        }
    }

    pub(crate) fn spawn_cycle(self: &Arc<Self>, trigger: &'static str) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match orchestrator.sync_now().await {
                Ok(report) if report.ran() => {
                    tracing::debug!("Sync cycle triggered by {trigger} finished");
                }
                Ok(_) => {}
                Err(error) => tracing::error!("Sync cycle triggered by {trigger} failed: {error}"),
            }
        })
    }

    /// Run one cycle over the next batch of pending items.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync already in progress; skipping request");
            return Ok(SyncReport::with_status(SyncStatus::AlreadyInProgress));
        }
        let _guard = SyncingGuard(&self.syncing);

        if !self.is_online() {
            tracing::debug!("Device offline; skipping sync");
            return Ok(SyncReport::with_status(SyncStatus::Offline));
        }

        let config = self.config();
        let batch = self.queue.next_batch(config.batch_size).await;
        let mut report = SyncReport::with_status(SyncStatus::Completed);

        for item in batch {
            match self.transport.apply(&item).await {
                ApplyOutcome::Applied => {
                    self.queue.settle(&item).await?;
                    report.synced += 1;
                    tracing::debug!("Synced {} {}", item.entity_kind, item.entity_id);
                }
                ApplyOutcome::Conflict(remote) => {
                    self.handle_conflict(&item, remote, &config, &mut report)
                        .await?;
                }
                ApplyOutcome::TransientError(reason) => {
                    report.errors += 1;
                    match self
                        .queue
                        .increment_retry(&item, config.max_retries)
                        .await?
                    {
                        RetryOutcome::Retained { retry_count } => tracing::warn!(
                            "Sync of {} {} failed (attempt {retry_count}/{}): {reason}",
                            item.entity_kind,
                            item.entity_id,
                            config.max_retries
                        ),
                        RetryOutcome::Exhausted(exhausted) => {
                            tracing::warn!(
                                "Dropping {} {} after {} failed attempts: {reason}",
                                exhausted.entity_kind,
                                exhausted.entity_id,
                                exhausted.retry_count
                            );
                            report.exhausted.push(exhausted);
                        }
                        RetryOutcome::Superseded | RetryOutcome::Missing => {}
                    }
                }
            }
        }

        self.queue.flush().await?;

        if report.errors > 0 {
            self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
        } else {
            self.consecutive_failures.store(0, Ordering::Release);
        }

        tracing::info!(
            "Sync cycle finished: {} synced, {} errors, {} conflicts",
            report.synced,
            report.errors,
            report.conflicts
        );
        Ok(report)
    }

    async fn handle_conflict(
        &self,
        item: &QueueItem,
        remote: RemoteRecord,
        config: &SyncConfig,
        report: &mut SyncReport,
    ) -> Result<()> {
        let conflict = build_conflict(&item.data, item.created_at, remote);
        if !conflict.is_conflict() {
            // Only metadata diverged; the remote already matches.
            self.queue.settle(item).await?;
            report.synced += 1;
            return Ok(());
        }

        let policy = item.policy.unwrap_or(config.default_policy);
        let resolution = resolve(&conflict, policy);
        let fields = conflict.fields.iter().map(ToString::to_string).collect();
        tracing::info!(
            "Conflict on {} {} ({:?}) resolved with {policy}",
            item.entity_kind,
            item.entity_id,
            conflict.fields
        );

        let (kind, winner) = match resolution {
            Resolution::KeepLocal(data) => {
                let mut mutation =
                    NewMutation::new(item.entity_kind, &item.entity_id, item.operation, data.clone())
                        .with_priority(item.priority)
                        .with_policy(ConflictPolicy::LocalWins)
                        .forced();
                if let Some(device_id) = item.device_id.clone().or_else(|| self.device_id.clone())
                {
                    mutation = mutation.with_device_id(device_id);
                }
                self.queue.replace(item, mutation).await?;
                (ResolutionKind::LocalKept, Some(data))
            }
            Resolution::KeepRemote(data) => {
                self.queue.settle(item).await?;
                (ResolutionKind::RemoteKept, Some(data))
            }
            Resolution::NeedsManual => match self.queue.mark_conflicted(item).await? {
                // The newer payload goes out on the next cycle instead.
                Delivery::Superseded => return Ok(()),
                Delivery::Recorded(_) | Delivery::Missing => (ResolutionKind::AwaitingManual, None),
            },
        };

        report.conflicts += 1;
        report.resolutions.push(ConflictResolution {
            item_id: item.id,
            entity_kind: item.entity_kind,
            entity_id: item.entity_id.clone(),
            policy,
            fields,
            kind,
            winner,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Operation;
    use crate::platform::ManualClock;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Replays scripted outcomes per entity id; unscripted calls succeed.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<HashMap<String, VecDeque<ApplyOutcome>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn script(&self, entity_id: &str, outcomes: Vec<ApplyOutcome>) {
            self.script
                .lock()
                .unwrap()
                .insert(entity_id.to_string(), outcomes.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteTransport for ScriptedTransport {
        async fn apply(&self, item: &QueueItem) -> ApplyOutcome {
            self.calls.lock().unwrap().push(item.entity_id.clone());
            self.script
                .lock()
                .unwrap()
                .get_mut(&item.entity_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(ApplyOutcome::Applied)
        }
    }

    /// Parks inside `apply` until released
    #[derive(Default)]
    struct BlockingTransport {
        entered: Notify,
        release: Notify,
        sent: Mutex<Vec<Value>>,
    }

    impl BlockingTransport {
        fn sent(&self) -> Vec<Value> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteTransport for BlockingTransport {
        async fn apply(&self, item: &QueueItem) -> ApplyOutcome {
            self.entered.notify_one();
            self.release.notified().await;
            self.sent.lock().unwrap().push(item.data.clone());
            ApplyOutcome::Applied
        }
    }

    async fn blocking_setup(config: SyncConfig) -> (Arc<SyncOrchestrator>, Arc<BlockingTransport>) {
        let queue = DurableQueue::load(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(T0)),
        )
        .await
        .unwrap();
        let transport = Arc::new(BlockingTransport::default());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(queue),
            transport.clone(),
            config,
            None,
        ));
        (orchestrator, transport)
    }

    const T0: i64 = 1_700_000_000_000;

    async fn setup(
        config: SyncConfig,
    ) -> (Arc<SyncOrchestrator>, Arc<ScriptedTransport>, MemoryStore) {
        let store = MemoryStore::new();
        let queue = DurableQueue::load(Arc::new(store.clone()), Arc::new(ManualClock::new(T0)))
            .await
            .unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::new(queue),
            transport.clone(),
            config,
            Some("device-1".to_string()),
        ));
        (orchestrator, transport, store)
    }

    fn entry(entity_id: &str, duration: f64) -> NewMutation {
        NewMutation::new(
            EntityKind::TimeEntry,
            entity_id,
            Operation::Update,
            json!({ "duration": duration, "project_id": "p1" }),
        )
    }

    fn remote(duration: f64, updated_at: i64) -> ApplyOutcome {
        ApplyOutcome::Conflict(RemoteRecord {
            data: json!({ "duration": duration, "project_id": "p1" }),
            updated_at,
        })
    }

    #[tokio::test]
    async fn successful_items_are_removed() {
        let (sync, transport, _) = setup(SyncConfig::default()).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();
        sync.queue().enqueue(entry("b", 1.0)).await.unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.synced, 2);
        assert_eq!((report.errors, report.conflicts), (0, 0));
        assert!(sync.queue().is_empty().await);
        assert_eq!(transport.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn items_are_attempted_in_priority_order() {
        let (sync, transport, _) = setup(SyncConfig::default()).await;
        sync.queue().enqueue(entry("low", 1.0).with_priority(1)).await.unwrap();
        sync.queue().enqueue(entry("high", 1.0).with_priority(5)).await.unwrap();
        sync.queue().enqueue(entry("mid", 1.0).with_priority(3)).await.unwrap();

        sync.sync_now().await.unwrap();
        assert_eq!(transport.calls(), vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn batch_size_limits_each_cycle() {
        let (sync, _, _) = setup(SyncConfig::default().with_batch_size(2)).await;
        for id in ["a", "b", "c"] {
            sync.queue().enqueue(entry(id, 1.0)).await.unwrap();
        }

        assert_eq!(sync.sync_now().await.unwrap().synced, 2);
        assert_eq!(sync.queue().len().await, 1);
        assert_eq!(sync.sync_now().await.unwrap().synced, 1);
    }

    #[tokio::test]
    async fn offline_cycle_returns_zero_counts() {
        let (sync, transport, _) = setup(SyncConfig::default()).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();
        assert!(sync.set_online(false).is_none());

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.status, SyncStatus::Offline);
        assert_eq!(report.synced, 0);
        assert!(transport.calls().is_empty());
        assert!(!sync.is_syncing());
    }

    #[tokio::test]
    async fn transient_errors_exhaust_after_max_retries() {
        let (sync, transport, _) = setup(SyncConfig::default().with_max_retries(3)).await;
        let item = sync.queue().enqueue(entry("a", 1.0)).await.unwrap();
        let failure = ApplyOutcome::TransientError("timeout".to_string());
        transport.script("a", vec![failure; 3]);

        for attempt in 1..=2 {
            let report = sync.sync_now().await.unwrap();
            assert_eq!(report.errors, 1);
            assert!(report.exhausted.is_empty());
            assert_eq!(sync.queue().get(&item.id).await.unwrap().retry_count, attempt);
        }

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.exhausted.len(), 1);
        assert_eq!(report.exhausted[0].id, item.id);
        assert!(sync.queue().get(&item.id).await.is_none());
        assert_eq!(sync.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn one_failing_item_does_not_block_the_batch() {
        let (sync, transport, _) = setup(SyncConfig::default()).await;
        transport.script("bad", vec![ApplyOutcome::TransientError("500".into())]);
        sync.queue().enqueue(entry("bad", 1.0).with_priority(9)).await.unwrap();
        sync.queue().enqueue(entry("good", 1.0)).await.unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!((report.synced, report.errors), (1, 1));
        assert_eq!(sync.queue().len().await, 1);
    }

    #[tokio::test]
    async fn server_wins_conflict_reports_remote_payload() {
        let config = SyncConfig::default().with_default_policy(ConflictPolicy::ServerWins);
        let (sync, transport, _) = setup(config).await;
        transport.script("a", vec![remote(2.5, T0 - 1)]);
        sync.queue().enqueue(entry("a", 2.0)).await.unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.conflicts, 1);
        assert!(sync.queue().is_empty().await);

        let resolution = &report.resolutions[0];
        assert_eq!(resolution.kind, ResolutionKind::RemoteKept);
        assert_eq!(resolution.fields, vec!["duration".to_string()]);
        assert_eq!(resolution.winner.as_ref().unwrap()["duration"], json!(2.5));
    }

    #[tokio::test]
    async fn local_win_requeues_forced_update() {
        let (sync, transport, _) = setup(SyncConfig::default()).await;
        transport.script("a", vec![remote(2.5, T0 + 10)]);
        let original = sync
            .queue()
            .enqueue(entry("a", 2.0).with_policy(ConflictPolicy::LocalWins))
            .await
            .unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.resolutions[0].kind, ResolutionKind::LocalKept);

        let items = sync.queue().items().await;
        assert_eq!(items.len(), 1);
        assert_ne!(items[0].id, original.id);
        assert!(items[0].force);
        assert_eq!(items[0].data["duration"], json!(2.0));
        assert_eq!(items[0].device_id.as_deref(), Some("device-1"));

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.synced, 1);
        assert!(sync.queue().is_empty().await);
    }

    #[tokio::test]
    async fn newest_wins_uses_item_policy_override_and_timestamps() {
        let config = SyncConfig::default().with_default_policy(ConflictPolicy::Manual);
        let (sync, transport, _) = setup(config).await;
        transport.script("a", vec![remote(2.5, T0)]);
        sync.queue()
            .enqueue(entry("a", 2.0).with_policy(ConflictPolicy::NewestWins))
            .await
            .unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.resolutions[0].policy, ConflictPolicy::NewestWins);
        assert_eq!(report.resolutions[0].kind, ResolutionKind::RemoteKept);
    }

    #[tokio::test]
    async fn manual_conflicts_are_parked() {
        let config = SyncConfig::default().with_default_policy(ConflictPolicy::Manual);
        let (sync, transport, _) = setup(config).await;
        transport.script("a", vec![remote(2.5, T0)]);
        let item = sync.queue().enqueue(entry("a", 2.0)).await.unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.resolutions[0].kind, ResolutionKind::AwaitingManual);
        assert!(sync.queue().get(&item.id).await.unwrap().is_conflicted());

        let report = sync.sync_now().await.unwrap();
        assert_eq!(report.synced + report.errors + report.conflicts, 0);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn metadata_only_conflict_counts_as_synced() {
        let (sync, transport, _) = setup(SyncConfig::default()).await;
        transport.script("a", vec![remote(2.0, T0 + 99)]);
        sync.queue().enqueue(entry("a", 2.0)).await.unwrap();

        let report = sync.sync_now().await.unwrap();
        assert_eq!((report.synced, report.conflicts), (1, 0));
        assert!(sync.queue().is_empty().await);
    }

    #[tokio::test]
    async fn persistence_failure_aborts_cycle_and_clears_flag() {
        let (sync, _, store) = setup(SyncConfig::default()).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();
        store.set_fail_writes(true);

        assert!(sync.sync_now().await.is_err());
        assert!(!sync.is_syncing());
        assert_eq!(sync.queue().len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_request_reports_already_in_progress() {
        let (sync, transport) = blocking_setup(SyncConfig::default().without_auto_sync()).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();

        let first = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.sync_now().await })
        };
        transport.entered.notified().await;

        let second = sync.sync_now().await.unwrap();
        assert_eq!(second.status, SyncStatus::AlreadyInProgress);
        assert_eq!(second.synced, 0);

        transport.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.synced, 1);
        assert!(!sync.is_syncing());
    }

    #[tokio::test]
    async fn reconnect_triggers_cycle_when_enabled() {
        let (sync, _, _) = setup(SyncConfig::default()).await;
        sync.set_online(false);
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();

        let handle = sync.set_online(true).expect("reconnect should trigger sync");
        handle.await.unwrap();
        assert!(sync.queue().is_empty().await);
    }

    #[tokio::test]
    async fn reconnect_is_ignored_when_disabled() {
        let config = SyncConfig::default().with_sync_on_reconnect(false);
        let (sync, _, _) = setup(config).await;
        sync.set_online(false);
        assert!(sync.set_online(true).is_none());
        assert!(sync.set_online(true).is_none());
    }

    #[tokio::test]
    async fn enqueue_trigger_respects_auto_sync() {
        let (sync, _, _) = setup(SyncConfig::default()).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();
        sync.notify_enqueued().unwrap().await.unwrap();
        assert!(sync.queue().is_empty().await);

        sync.replace_config(SyncConfig::default().without_auto_sync())
            .unwrap();
        assert!(sync.notify_enqueued().is_none());
    }

    #[test]
    fn replace_config_rejects_invalid_settings() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let (sync, _, _) = runtime.block_on(setup(SyncConfig::default()));
        assert!(sync
            .replace_config(SyncConfig::default().with_batch_size(0))
            .is_err());
        assert_eq!(sync.config().batch_size, SyncConfig::default().batch_size);
    }

    #[tokio::test]
    async fn payload_coalesced_mid_flight_is_sent_next_cycle() {
        let (sync, transport) = blocking_setup(SyncConfig::default().without_auto_sync()).await;
        let key = "time_entry:a:update";
        sync.queue()
            .enqueue(entry("a", 1.0).with_idempotency_key(key))
            .await
            .unwrap();

        let running = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.sync_now().await })
        };
        transport.entered.notified().await;
        sync.queue()
            .enqueue(entry("a", 9.0).with_idempotency_key(key))
            .await
            .unwrap();
        transport.release.notify_one();

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.synced, 1);
        let items = sync.queue().items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data["duration"], json!(9.0));
        assert_eq!(items[0].retry_count, 0);

        transport.release.notify_one();
        assert_eq!(sync.sync_now().await.unwrap().synced, 1);
        assert!(sync.queue().is_empty().await);
        let durations: Vec<Value> = transport
            .sent()
            .iter()
            .map(|data| data["duration"].clone())
            .collect();
        assert_eq!(durations, vec![json!(1.0), json!(9.0)]);
    }

    #[tokio::test]
    async fn local_win_is_recorded_in_a_single_write() {
        let (sync, transport, store) = setup(SyncConfig::default()).await;
        transport.script("a", vec![remote(2.5, T0 + 10)]);
        let original = sync
            .queue()
            .enqueue(entry("a", 2.0).with_policy(ConflictPolicy::LocalWins))
            .await
            .unwrap();

        // The replacement lands; the end-of-cycle flush is rejected.
        store.fail_writes_after(1);
        assert!(sync.sync_now().await.is_err());
        assert!(!sync.is_syncing());

        store.set_fail_writes(false);
        let reloaded = DurableQueue::load(Arc::new(store), Arc::new(ManualClock::new(T0)))
            .await
            .unwrap();
        let items = reloaded.items().await;
        assert_eq!(items.len(), 1);
        assert_ne!(items[0].id, original.id);
        assert!(items[0].force);
        assert_eq!(items[0].data["duration"], json!(2.0));
    }

    #[tokio::test]
    async fn disabling_auto_sync_lets_running_cycle_finish() {
        let (sync, transport) = blocking_setup(SyncConfig::default()).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();

        let running = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.sync_now().await })
        };
        transport.entered.notified().await;
        sync.replace_config(SyncConfig::default().without_auto_sync())
            .unwrap();
        transport.release.notify_one();

        let report = running.await.unwrap().unwrap();
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.synced, 1);
        assert!(sync.queue().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_shutdown_lets_running_cycle_finish() {
        let config = SyncConfig::default().with_sync_interval(Duration::from_secs(10));
        let (sync, transport) = blocking_setup(config).await;
        sync.queue().enqueue(entry("a", 1.0)).await.unwrap();

        let handle = sync.spawn_scheduler();
        transport.entered.notified().await;
        assert!(sync.is_syncing());

        tokio::join!(handle.shutdown(), async {
            transport.release.notify_one();
        });

        assert!(!sync.is_syncing());
        assert!(sync.queue().is_empty().await);
        assert_eq!(transport.sent().len(), 1);
    }
}
