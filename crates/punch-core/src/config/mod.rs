//! Sync and timer configuration.
//!
//! `SyncConfig` is constructed once at startup and may be replaced wholesale;
//! sync cycles take a snapshot when they begin, so a replacement never changes
//! the settings of a cycle that is already running.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::ConflictPolicy;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BATCH_SIZE: usize = 20;

const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_STALE_SECS: u64 = 120;

/// Process-wide sync settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Start cycles automatically on enqueue and on the interval tick
    pub auto_sync: bool,
    /// Seconds between scheduled cycles
    pub sync_interval_secs: u64,
    /// Policy used when a queue item carries no override
    pub default_policy: ConflictPolicy,
    /// Start a cycle on an offline -> online transition
    pub sync_on_reconnect: bool,
    /// Retry count at which an item is dropped
    pub max_retries: u32,
    /// Items attempted per cycle
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            default_policy: ConflictPolicy::NewestWins,
            sync_on_reconnect: true,
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_secs = interval.as_secs();
        self
    }

    /// Disable automatic sync (manual sync only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.auto_sync = false;
        self
    }

    #[must_use]
    pub const fn with_default_policy(mut self, policy: ConflictPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_sync_on_reconnect(mut self, enabled: bool) -> Self {
        self.sync_on_reconnect = enabled;
        self
    }

    /// Reject settings that would stall the queue
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidInput(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidInput(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.auto_sync && self.sync_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "sync_interval_secs must be positive when auto_sync is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a JSON config document, filling defaults for missing keys
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }
}

/// Background timer cadence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TimerConfig {
    /// Milliseconds between elapsed-time recomputations
    pub tick_interval_ms: u64,
    /// Seconds between heartbeat writes
    pub heartbeat_interval_secs: u64,
    /// Seconds without a heartbeat after which the host is presumed gone
    pub heartbeat_stale_after_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            heartbeat_stale_after_secs: DEFAULT_HEARTBEAT_STALE_SECS,
        }
    }
}

impl TimerConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[allow(clippy::cast_possible_wrap)]
    pub const fn heartbeat_stale_after_ms(&self) -> i64 {
        (self.heartbeat_stale_after_secs as i64).saturating_mul(1000)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 || self.heartbeat_interval_secs == 0 {
            return Err(Error::InvalidInput(
                "timer intervals must be positive".to_string(),
            ));
        }
        if self.heartbeat_stale_after_secs < self.heartbeat_interval_secs {
            return Err(Error::InvalidInput(
                "heartbeat_stale_after_secs must not be shorter than the heartbeat interval"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
