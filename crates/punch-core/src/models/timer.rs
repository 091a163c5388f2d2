//! Persisted background timer model

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the background timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Stopped,
    Running,
    Paused,
}

/// The single active timer of this device.
///
/// `start_time` is shifted forward on every resume by the paused duration, so
/// elapsed time is always `now - start_time` while running and
/// `pause_time - start_time` while paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundTimerState {
    pub is_running: bool,
    /// Effective start (Unix ms), shifted by pauses
    pub start_time: i64,
    /// When the timer was paused (Unix ms)
    #[serde(default)]
    pub pause_time: Option<i64>,
    /// Last computed elapsed time; informational, recomputed on read
    pub elapsed_seconds: i64,
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub employee_id: String,
    /// Last liveness timestamp (Unix ms)
    pub last_heartbeat: i64,
    pub battery_optimized: bool,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Wall-clock start before any pause shifting (Unix ms)
    #[serde(default)]
    pub started_at: i64,
}

impl BackgroundTimerState {
    /// Fresh running state started at `now`
    pub fn started(
        project_id: impl Into<String>,
        task_id: Option<String>,
        employee_id: impl Into<String>,
        battery_optimized: bool,
        device_id: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            is_running: true,
            start_time: now,
            pause_time: None,
            elapsed_seconds: 0,
            project_id: project_id.into(),
            task_id,
            employee_id: employee_id.into(),
            last_heartbeat: now,
            battery_optimized,
            device_id,
            started_at: now,
        }
    }

    pub const fn phase(&self) -> TimerPhase {
        if self.is_running {
            TimerPhase::Running
        } else if self.pause_time.is_some() {
            TimerPhase::Paused
        } else {
            TimerPhase::Stopped
        }
    }

    /// Elapsed work time in milliseconds, derived purely from wall-clock values
    pub fn elapsed_millis_at(&self, now: i64) -> i64 {
        let end = match self.pause_time {
            Some(pause_time) if !self.is_running => pause_time,
            _ => now,
        };
        end.saturating_sub(self.start_time).max(0)
    }

    pub fn elapsed_seconds_at(&self, now: i64) -> i64 {
        self.elapsed_millis_at(now) / 1000
    }

    /// Recompute the cached `elapsed_seconds` field
    pub fn refresh_elapsed(&mut self, now: i64) {
        self.elapsed_seconds = self.elapsed_seconds_at(now);
    }

    /// Freeze elapsed time at `now`
    pub fn pause(&mut self, now: i64) {
        self.refresh_elapsed(now);
        self.is_running = false;
        self.pause_time = Some(now);
    }

    /// Shift `start_time` by the paused duration and keep running
    pub fn resume(&mut self, now: i64) {
        if let Some(pause_time) = self.pause_time.take() {
            let paused_for = now.saturating_sub(pause_time).max(0);
            self.start_time = self.start_time.saturating_add(paused_for);
        }
        self.is_running = true;
        self.last_heartbeat = now;
        self.refresh_elapsed(now);
    }

    /// Whether no heartbeat was written within `window_ms` of `now`
    pub const fn is_heartbeat_stale(&self, now: i64, window_ms: i64) -> bool {
        self.is_running && now.saturating_sub(self.last_heartbeat) > window_ms
    }
}
