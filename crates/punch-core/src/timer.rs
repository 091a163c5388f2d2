//! Background timer agent.
//!
//! One persisted timer per device, independent of any UI lifecycle. Elapsed
//! time is always derived from `(now, start_time, pause_time)`, so missed
//! ticks while the process is suspended never lose time. While running, a
//! tick task and a heartbeat task share one cancellation token and the
//! wake-lock is held through a guard that releases it on drop.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::TimerConfig;
use crate::error::{Error, Result};
use crate::models::{BackgroundTimerState, EntityKind, NewMutation, Operation, QueueItem, TimerPhase};
use crate::platform::{Clock, WakeLock, WakeLockGuard};
use crate::queue::DurableQueue;
use crate::storage::{load_json, save_json, KeyValueStore, TIMER_STATE_KEY};
use crate::util::normalize_text_option;

/// Liveness of the running timer's host process as seen through heartbeats.
///
/// Staleness is only reported; deciding whether to stop the timer is up to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum HeartbeatStatus {
    /// No running timer
    Idle,
    Fresh,
    /// No heartbeat for `silent_for_ms`
    Stale { silent_for_ms: i64 },
}

/// Work interval produced by stopping the timer
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedInterval {
    pub elapsed_seconds: i64,
    /// Mutation queued for the remote store
    pub item: QueueItem,
}

type SharedState = Arc<Mutex<Option<BackgroundTimerState>>>;

/// Tick and heartbeat tasks bound to one token; dropping cancels both.
struct TimerTasks {
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl TimerTasks {
    fn cancel(&self) {
        self.cancel_token.cancel();
    }

    fn is_active(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    async fn join(mut self) {
        self.cancel();
        for handle in self.handles.drain(..) {
            if let Err(error) = handle.await {
                tracing::error!("Timer task failed: {error}");
            }
        }
    }
}

impl Drop for TimerTasks {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Resources that exist only while the timer is in Running
struct RunningResources {
    tasks: TimerTasks,
    wake_lock: Option<WakeLockGuard>,
}

pub struct BackgroundTimerAgent {
    store: Arc<dyn KeyValueStore>,
    queue: Arc<DurableQueue>,
    clock: Arc<dyn Clock>,
    wake_lock: Arc<dyn WakeLock>,
    device_id: Option<String>,
    config: TimerConfig,
    state: SharedState,
    running: Mutex<Option<RunningResources>>,
}

impl BackgroundTimerAgent {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        queue: Arc<DurableQueue>,
        clock: Arc<dyn Clock>,
        wake_lock: Arc<dyn WakeLock>,
        device_id: Option<String>,
        config: TimerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            wake_lock,
            device_id,
            config,
            state: Arc::new(Mutex::new(None)),
            running: Mutex::new(None),
        }
    }

    /// Reload a timer persisted by a previous process.
    ///
    /// A running timer gets its tasks and wake-lock back; elapsed time covers
    /// the whole period the process was gone.
    pub async fn restore(&self) -> Result<Option<BackgroundTimerState>> {
        let Some(mut restored) =
            load_json::<BackgroundTimerState, _>(self.store.as_ref(), TIMER_STATE_KEY).await?
        else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        if restored.is_heartbeat_stale(now, self.config.heartbeat_stale_after_ms()) {
            tracing::warn!(
                "Restored timer has a stale heartbeat ({} ms old); host process likely died",
                now - restored.last_heartbeat
            );
        }
        restored.refresh_elapsed(now);

        let mut state = self.state.lock().await;
        *state = Some(restored.clone());
        if restored.phase() == TimerPhase::Running {
            self.enter_running(restored.battery_optimized).await;
        }
        drop(state);

        tracing::info!(
            "Restored {:?} timer for project {} ({}s elapsed)",
            restored.phase(),
            restored.project_id,
            restored.elapsed_seconds
        );
        Ok(Some(restored))
    }

    /// Start a new timer, stopping (and queuing) any previous one first.
    pub async fn start(
        &self,
        project_id: &str,
        task_id: Option<&str>,
        employee_id: &str,
        battery_optimized: bool,
    ) -> Result<BackgroundTimerState> {
        let project_id = normalize_text_option(Some(project_id.to_string()))
            .ok_or_else(|| Error::InvalidInput("project id must not be empty".to_string()))?;
        let employee_id = normalize_text_option(Some(employee_id.to_string()))
            .ok_or_else(|| Error::InvalidInput("employee id must not be empty".to_string()))?;
        let task_id = normalize_text_option(task_id.map(ToString::to_string));

        let mut previous_tasks = None;
        let mut state = self.state.lock().await;
        if let Some(previous) = state.as_ref() {
            tracing::info!(
                "Stopping timer for project {} before starting a new one",
                previous.project_id
            );
            let (_, tasks) = self.finish_locked(&mut state).await?;
            previous_tasks = tasks;
        }

        let started = BackgroundTimerState::started(
            project_id,
            task_id,
            employee_id,
            battery_optimized,
            self.device_id.clone(),
            self.clock.now_millis(),
        );
        save_json(self.store.as_ref(), TIMER_STATE_KEY, &started).await?;
        *state = Some(started.clone());
        self.enter_running(battery_optimized).await;
        drop(state);

        if let Some(tasks) = previous_tasks {
            tasks.join().await;
        }
        tracing::info!("Timer started for project {}", started.project_id);
        Ok(started)
    }

    /// Running -> Paused; elapsed time freezes and the wake-lock is released.
    pub async fn pause(&self) -> Result<BackgroundTimerState> {
        let mut state = self.state.lock().await;
        let mut paused = state
            .as_ref()
            .filter(|current| current.phase() == TimerPhase::Running)
            .cloned()
            .ok_or_else(|| Error::InvalidTransition("pause requires a running timer".to_string()))?;

        paused.pause(self.clock.now_millis());
        save_json(self.store.as_ref(), TIMER_STATE_KEY, &paused).await?;
        *state = Some(paused.clone());
        let tasks = self.leave_running().await;
        drop(state);

        if let Some(tasks) = tasks {
            tasks.join().await;
        }
        tracing::info!("Timer paused at {}s", paused.elapsed_seconds);
        Ok(paused)
    }

    /// Paused -> Running; `start_time` shifts by the paused duration.
    pub async fn resume(&self) -> Result<BackgroundTimerState> {
        let mut state = self.state.lock().await;
        let mut resumed = state
            .as_ref()
            .filter(|current| current.phase() == TimerPhase::Paused)
            .cloned()
            .ok_or_else(|| Error::InvalidTransition("resume requires a paused timer".to_string()))?;

        resumed.resume(self.clock.now_millis());
        save_json(self.store.as_ref(), TIMER_STATE_KEY, &resumed).await?;
        *state = Some(resumed.clone());
        self.enter_running(resumed.battery_optimized).await;
        drop(state);

        tracing::info!("Timer resumed at {}s", resumed.elapsed_seconds);
        Ok(resumed)
    }

    /// Running/Paused -> Stopped; queues the completed interval.
    pub async fn stop(&self) -> Result<CompletedInterval> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            return Err(Error::InvalidTransition(
                "stop requires a running or paused timer".to_string(),
            ));
        }
        let (completed, tasks) = self.finish_locked(&mut state).await?;
        drop(state);

        if let Some(tasks) = tasks {
            tasks.join().await;
        }
        Ok(completed)
    }

    /// Queue the interval, delete persisted state, then tear down tasks.
    ///
    /// The queued mutation carries an idempotency key derived from the
    /// timer's start, so a stop retried after a failed delete does not
    /// duplicate the entry.
    async fn finish_locked(
        &self,
        state: &mut Option<BackgroundTimerState>,
    ) -> Result<(CompletedInterval, Option<TimerTasks>)> {
        let Some(current) = state.as_ref() else {
            return Err(Error::InvalidTransition("no timer to stop".to_string()));
        };

        let now = self.clock.now_millis();
        let elapsed_seconds = current.elapsed_seconds_at(now);
        let end_time = match current.pause_time {
            Some(pause_time) if !current.is_running => pause_time,
            _ => now,
        };
        let device_id = current.device_id.clone().or_else(|| self.device_id.clone());

        #[allow(clippy::cast_precision_loss)]
        let duration_hours = elapsed_seconds as f64 / 3600.0;
        let data = json!({
            "project_id": current.project_id,
            "task_id": current.task_id,
            "employee_id": current.employee_id,
            "start_time": current.started_at,
            "end_time": end_time,
            "duration": duration_hours,
            "elapsed_seconds": elapsed_seconds,
            "device_id": device_id,
            "source": "background_timer",
        });

        let mut mutation = NewMutation::new(
            EntityKind::TimeEntry,
            Uuid::now_v7().to_string(),
            Operation::Create,
            data,
        )
        .with_idempotency_key(format!(
            "timer:{}:{}",
            device_id.as_deref().unwrap_or("local"),
            current.started_at
        ));
        if let Some(device_id) = device_id {
            mutation = mutation.with_device_id(device_id);
        }

        let item = self.queue.enqueue(mutation).await?;
        self.store.delete(TIMER_STATE_KEY).await?;
        *state = None;
        let tasks = self.leave_running().await;

        tracing::info!("Timer stopped after {elapsed_seconds}s; interval queued as {}", item.id);
        Ok((
            CompletedInterval {
                elapsed_seconds,
                item,
            },
            tasks,
        ))
    }

    /// Spawn tick/heartbeat tasks and take the wake-lock when requested.
    async fn enter_running(&self, battery_optimized: bool) {
        let wake_lock = if battery_optimized {
            match WakeLockGuard::acquire(Arc::clone(&self.wake_lock)).await {
                Ok(guard) => {
                    tracing::debug!("Wake-lock acquired");
                    Some(guard)
                }
                Err(error) => {
                    tracing::warn!("Continuing without wake-lock: {error}");
                    None
                }
            }
        } else {
            None
        };

        let tasks = self.spawn_tasks();
        let previous = self
            .running
            .lock()
            .await
            .replace(RunningResources { tasks, wake_lock });
        if let Some(previous) = previous {
            previous.tasks.cancel();
        }
    }

    /// Cancel the tasks and release the wake-lock; the caller joins the tasks
    /// after releasing the state lock.
    async fn leave_running(&self) -> Option<TimerTasks> {
        let RunningResources { tasks, wake_lock } = self.running.lock().await.take()?;
        tasks.cancel();
        drop(wake_lock);
        Some(tasks)
    }

    fn spawn_tasks(&self) -> TimerTasks {
        let cancel_token = CancellationToken::new();
        let tick = tokio::spawn(tick_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.clock),
            self.config.clone(),
            cancel_token.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.clock),
            Arc::clone(&self.store),
            self.config.clone(),
            cancel_token.clone(),
        ));
        TimerTasks {
            cancel_token,
            handles: vec![tick, heartbeat],
        }
    }

    /// Current timer with elapsed time recomputed from the wall clock
    pub async fn state(&self) -> Option<BackgroundTimerState> {
        let now = self.clock.now_millis();
        self.state.lock().await.clone().map(|mut state| {
            state.refresh_elapsed(now);
            state
        })
    }

    pub async fn phase(&self) -> TimerPhase {
        self.state
            .lock()
            .await
            .as_ref()
            .map_or(TimerPhase::Stopped, BackgroundTimerState::phase)
    }

    pub async fn heartbeat_status(&self) -> HeartbeatStatus {
        let now = self.clock.now_millis();
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(current) if current.is_running => {
                if current.is_heartbeat_stale(now, self.config.heartbeat_stale_after_ms()) {
                    HeartbeatStatus::Stale {
                        silent_for_ms: now - current.last_heartbeat,
                    }
                } else {
                    HeartbeatStatus::Fresh
                }
            }
            _ => HeartbeatStatus::Idle,
        }
    }

    /// Whether tick/heartbeat tasks are currently alive
    pub async fn has_background_tasks(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| running.tasks.is_active())
    }

    /// Whether this agent currently holds the wake-lock
    pub async fn holds_wake_lock(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| running.wake_lock.is_some())
    }
}

async fn tick_loop(
    state: SharedState,
    clock: Arc<dyn Clock>,
    config: TimerConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut state = state.lock().await;
        if cancel_token.is_cancelled() {
            break;
        }
        if let Some(current) = state.as_mut().filter(|current| current.is_running) {
            current.refresh_elapsed(clock.now_millis());
        }
    }
    tracing::trace!("Timer tick task stopped");
}

async fn heartbeat_loop(
    state: SharedState,
    clock: Arc<dyn Clock>,
    store: Arc<dyn KeyValueStore>,
    config: TimerConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut state = state.lock().await;
        if cancel_token.is_cancelled() {
            break;
        }
        let Some(mut next) = state.as_ref().filter(|current| current.is_running).cloned() else {
            continue;
        };

        let now = clock.now_millis();
        next.last_heartbeat = now;
        next.refresh_elapsed(now);
        match save_json(store.as_ref(), TIMER_STATE_KEY, &next).await {
            Ok(()) => *state = Some(next),
            Err(error) => tracing::warn!("Failed to persist timer heartbeat: {error}"),
        }
    }
    tracing::trace!("Timer heartbeat task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CountingWakeLock, ManualClock, NoWakeLock};
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        agent: BackgroundTimerAgent,
        store: MemoryStore,
        clock: ManualClock,
        wake_lock: CountingWakeLock,
        queue: Arc<DurableQueue>,
    }

    async fn harness() -> Harness {
        harness_with(TimerConfig::default()).await
    }

    async fn harness_with(config: TimerConfig) -> Harness {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let wake_lock = CountingWakeLock::new();
        let queue = Arc::new(
            DurableQueue::load(Arc::new(store.clone()), Arc::new(clock.clone()))
                .await
                .unwrap(),
        );
        let agent = BackgroundTimerAgent::new(
            Arc::new(store.clone()),
            Arc::clone(&queue),
            Arc::new(clock.clone()),
            Arc::new(wake_lock.clone()),
            Some("device-1".to_string()),
            config,
        );
        Harness {
            agent,
            store,
            clock,
            wake_lock,
            queue,
        }
    }

    #[tokio::test]
    async fn pause_resume_excludes_paused_time() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", false).await.unwrap();

        h.clock.advance(Duration::from_secs(600));
        h.agent.pause().await.unwrap();
        h.clock.advance(Duration::from_secs(300));
        h.agent.resume().await.unwrap();
        h.clock.advance(Duration::from_secs(600));

        let completed = h.agent.stop().await.unwrap();
        assert_eq!(completed.elapsed_seconds, 1200);
        assert_eq!(completed.item.data["duration"], json!(1200.0 / 3600.0));
        assert_eq!(completed.item.data["start_time"], json!(T0));
        assert_eq!(completed.item.data["end_time"], json!(T0 + 1_500_000));
        assert_eq!(h.agent.phase().await, TimerPhase::Stopped);
    }

    #[tokio::test]
    async fn elapsed_is_recomputed_after_missed_ticks() {
        let h = harness().await;
        h.agent.start("p1", Some("t1"), "e1", false).await.unwrap();
        h.clock.advance(Duration::from_secs(3 * 3600));

        let state = h.agent.state().await.unwrap();
        assert_eq!(state.elapsed_seconds, 3 * 3600);
        assert_eq!(state.task_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn start_persists_state_and_stop_deletes_it() {
        let h = harness().await;
        let started = h.agent.start("p1", None, "e1", false).await.unwrap();

        let persisted: BackgroundTimerState =
            serde_json::from_str(&h.store.raw(TIMER_STATE_KEY).unwrap()).unwrap();
        assert_eq!(persisted, started);
        assert_eq!(persisted.device_id.as_deref(), Some("device-1"));

        let completed = h.agent.stop().await.unwrap();
        assert!(h.store.raw(TIMER_STATE_KEY).is_none());
        assert_eq!(h.queue.items().await, vec![completed.item.clone()]);
        assert_eq!(completed.item.entity_kind, EntityKind::TimeEntry);
        assert_eq!(completed.item.operation, Operation::Create);
    }

    #[tokio::test]
    async fn starting_again_stops_previous_timer() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", false).await.unwrap();
        h.clock.advance(Duration::from_secs(60));
        h.agent.start("p2", None, "e1", false).await.unwrap();

        let items = h.queue.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data["project_id"], json!("p1"));
        assert_eq!(items[0].data["elapsed_seconds"], json!(60));
        assert_eq!(h.agent.state().await.unwrap().project_id, "p2");
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let h = harness().await;
        assert!(matches!(
            h.agent.pause().await,
            Err(Error::InvalidTransition(_))
        ));
        assert!(matches!(
            h.agent.stop().await,
            Err(Error::InvalidTransition(_))
        ));

        h.agent.start("p1", None, "e1", false).await.unwrap();
        assert!(matches!(
            h.agent.resume().await,
            Err(Error::InvalidTransition(_))
        ));
        assert!(h.agent.start(" ", None, "e1", false).await.is_err());
    }

    #[tokio::test]
    async fn wake_lock_is_held_only_while_running() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", true).await.unwrap();
        assert_eq!(h.wake_lock.held(), 1);
        assert!(h.agent.holds_wake_lock().await);

        h.agent.pause().await.unwrap();
        assert_eq!(h.wake_lock.held(), 0);

        h.agent.resume().await.unwrap();
        assert_eq!(h.wake_lock.held(), 1);

        h.agent.stop().await.unwrap();
        assert_eq!(h.wake_lock.held(), 0);
        assert_eq!(h.wake_lock.acquired(), 2);
    }

    #[tokio::test]
    async fn wake_lock_is_skipped_without_battery_optimization() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", false).await.unwrap();
        assert_eq!(h.wake_lock.acquired(), 0);
    }

    #[tokio::test]
    async fn dropping_agent_releases_wake_lock() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", true).await.unwrap();
        let wake_lock = h.wake_lock.clone();
        drop(h);
        assert_eq!(wake_lock.held(), 0);
    }

    #[tokio::test]
    async fn missing_wake_lock_capability_degrades() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(T0);
        let queue = Arc::new(
            DurableQueue::load(Arc::new(store.clone()), Arc::new(clock.clone()))
                .await
                .unwrap(),
        );
        let agent = BackgroundTimerAgent::new(
            Arc::new(store),
            queue,
            Arc::new(clock),
            Arc::new(NoWakeLock),
            None,
            TimerConfig::default(),
        );

        agent.start("p1", None, "e1", true).await.unwrap();
        assert_eq!(agent.phase().await, TimerPhase::Running);
        assert!(!agent.holds_wake_lock().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_tick_and_heartbeat_tasks() {
        let config = TimerConfig {
            tick_interval_ms: 100,
            heartbeat_interval_secs: 1,
            heartbeat_stale_after_secs: 5,
        };
        let h = harness_with(config).await;
        h.agent.start("p1", None, "e1", false).await.unwrap();
        assert!(h.agent.has_background_tasks().await);

        let before = h.store.write_count();
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert!(h.store.write_count() > before, "heartbeats should be written");

        h.agent.stop().await.unwrap();
        assert!(!h.agent.has_background_tasks().await);

        let after_stop = h.store.write_count();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.store.write_count(), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_refreshes_last_heartbeat() {
        let config = TimerConfig {
            tick_interval_ms: 1_000,
            heartbeat_interval_secs: 2,
            heartbeat_stale_after_secs: 10,
        };
        let h = harness_with(config).await;
        h.agent.start("p1", None, "e1", false).await.unwrap();

        h.clock.advance(Duration::from_secs(30));
        assert!(matches!(
            h.agent.heartbeat_status().await,
            HeartbeatStatus::Stale { silent_for_ms: 30_000 }
        ));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(h.agent.heartbeat_status().await, HeartbeatStatus::Fresh);
        assert_eq!(h.agent.state().await.unwrap().last_heartbeat, T0 + 30_000);
    }

    #[tokio::test]
    async fn heartbeat_status_is_idle_when_paused() {
        let h = harness().await;
        assert_eq!(h.agent.heartbeat_status().await, HeartbeatStatus::Idle);
        h.agent.start("p1", None, "e1", false).await.unwrap();
        h.agent.pause().await.unwrap();
        h.clock.advance(Duration::from_secs(3600));
        assert_eq!(h.agent.heartbeat_status().await, HeartbeatStatus::Idle);
    }

    #[tokio::test]
    async fn restore_resumes_running_timer_with_wall_clock_elapsed() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", true).await.unwrap();
        h.clock.advance(Duration::from_secs(120));
        drop(h.agent);

        h.clock.advance(Duration::from_secs(480));
        let revived = BackgroundTimerAgent::new(
            Arc::new(h.store.clone()),
            Arc::clone(&h.queue),
            Arc::new(h.clock.clone()),
            Arc::new(h.wake_lock.clone()),
            Some("device-1".to_string()),
            TimerConfig::default(),
        );
        let restored = revived.restore().await.unwrap().unwrap();
        assert_eq!(restored.elapsed_seconds, 600);
        assert_eq!(revived.phase().await, TimerPhase::Running);
        assert!(revived.has_background_tasks().await);
        assert_eq!(h.wake_lock.held(), 1);
    }

    #[tokio::test]
    async fn restore_keeps_paused_timer_frozen() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", true).await.unwrap();
        h.clock.advance(Duration::from_secs(60));
        h.agent.pause().await.unwrap();
        drop(h.agent);

        h.clock.advance(Duration::from_secs(3600));
        let revived = BackgroundTimerAgent::new(
            Arc::new(h.store.clone()),
            Arc::clone(&h.queue),
            Arc::new(h.clock.clone()),
            Arc::new(h.wake_lock.clone()),
            None,
            TimerConfig::default(),
        );
        let restored = revived.restore().await.unwrap().unwrap();
        assert_eq!(restored.phase(), TimerPhase::Paused);
        assert_eq!(restored.elapsed_seconds, 60);
        assert!(!revived.has_background_tasks().await);
        assert_eq!(h.wake_lock.held(), 0);
    }

    #[tokio::test]
    async fn failed_stop_keeps_timer_and_retry_does_not_duplicate() {
        let h = harness().await;
        h.agent.start("p1", None, "e1", false).await.unwrap();
        h.clock.advance(Duration::from_secs(60));

        h.store.set_fail_writes(true);
        assert!(h.agent.stop().await.is_err());
        assert_eq!(h.agent.phase().await, TimerPhase::Running);
        h.store.set_fail_writes(false);

        h.agent.stop().await.unwrap();
        assert_eq!(h.queue.len().await, 1);
    }

    #[tokio::test]
    async fn start_failure_leaves_timer_stopped() {
        let h = harness().await;
        h.store.set_fail_writes(true);
        assert!(h.agent.start("p1", None, "e1", true).await.is_err());
        assert_eq!(h.agent.phase().await, TimerPhase::Stopped);
        assert_eq!(h.wake_lock.acquired(), 0);
    }
}
