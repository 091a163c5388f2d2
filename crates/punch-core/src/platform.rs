//! Narrow platform capabilities: wall clock and wake-lock.
//!
//! Hosts without a wake-lock plug in [`NoWakeLock`]; the timer logs the
//! missing capability and keeps running without it.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::util::unix_millis_now;

/// Source of wall-clock timestamps (Unix ms)
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        unix_millis_now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// OS request to keep the device awake.
///
/// Single holder: the timer acquires it when entering Running and releases it
/// on every exit from Running.
#[async_trait]
pub trait WakeLock: Send + Sync {
    /// Request the lock; `CapabilityUnavailable` when the platform has none
    async fn acquire(&self) -> Result<()>;

    /// Give the lock back; must be safe to call from `Drop`
    fn release(&self);
}

/// Wake-lock for platforms that do not offer one
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWakeLock;

#[async_trait]
impl WakeLock for NoWakeLock {
    async fn acquire(&self) -> Result<()> {
        Err(Error::CapabilityUnavailable(
            "wake-lock is not supported on this platform".to_string(),
        ))
    }

    fn release(&self) {}
}

/// Wake-lock that just counts calls; useful for hosts that want to observe
/// the discipline, and for tests.
#[derive(Debug, Clone, Default)]
pub struct CountingWakeLock {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl CountingWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Acquisitions not yet released
    pub fn held(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

#[async_trait]
impl WakeLock for CountingWakeLock {
    async fn acquire(&self) -> Result<()> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Held wake-lock; released when dropped
pub struct WakeLockGuard {
    lock: Arc<dyn WakeLock>,
}

impl WakeLockGuard {
    /// Acquire `lock` and tie its release to the returned guard
    pub async fn acquire(lock: Arc<dyn WakeLock>) -> Result<Self> {
        lock.acquire().await?;
        Ok(Self { lock })
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        self.lock.release();
        tracing::debug!("Wake-lock released");
    }
}

impl std::fmt::Debug for WakeLockGuard {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("WakeLockGuard").finish_non_exhaustive()
    }
}
