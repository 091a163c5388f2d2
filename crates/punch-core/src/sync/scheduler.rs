//! Recurring sync trigger with failure backoff

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SyncOrchestrator;

const BACKOFF_BASE_SECONDS: u64 = 5;
const BACKOFF_MAX_EXPONENT: u32 = 8;

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(consecutive_failures: u32) -> u64 {
    if consecutive_failures == 0 {
        return 0;
    }
    let exponent = (consecutive_failures - 1).min(BACKOFF_MAX_EXPONENT);
    2_u64.pow(exponent) * BACKOFF_BASE_SECONDS
}

/// Running interval loop; cancelled on `shutdown` or drop.
pub struct SchedulerHandle {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop scheduling new cycles and wait for the loop to exit.
    ///
    /// A cycle that is already running is allowed to finish.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::error!("Sync scheduler task failed: {error}");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl SyncOrchestrator {
    /// Delay before the next scheduled cycle: the configured interval plus
    /// backoff after consecutive failing cycles.
    pub fn next_scheduled_delay(&self) -> Duration {
        let interval = self.config().sync_interval();
        interval + Duration::from_secs(backoff_seconds(self.consecutive_failures()))
    }

    /// Start the recurring interval trigger.
    ///
    /// Each tick re-reads the configuration; with auto-sync disabled the tick
    /// is skipped.
    pub fn spawn_scheduler(self: &Arc<Self>) -> SchedulerHandle {
        let cancel_token = CancellationToken::new();
        let inner_token = cancel_token.child_token();
        let orchestrator = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                let delay = orchestrator.next_scheduled_delay();
                tokio::select! {
                    () = inner_token.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                if !orchestrator.config().auto_sync {
                    continue;
                }

                // The cycle itself is not raced against cancellation so it
                // always completes once started.
                match orchestrator.sync_now().await {
                    Ok(report) if report.errors > 0 => tracing::debug!(
                        "Scheduled sync had {} error(s); next attempt in {:?}",
                        report.errors,
                        orchestrator.next_scheduled_delay()
                    ),
                    Ok(_) => {}
                    Err(error) if error.is_persistence() => {
                        tracing::error!("Scheduled sync aborted, queue not persisted: {error}");
                    }
                    Err(error) => tracing::warn!("Scheduled sync failed: {error}"),
                }
            }
            tracing::debug!("Sync scheduler stopped");
        });

        SchedulerHandle {
            cancel_token,
            task: Some(task),
        }
    }
}
