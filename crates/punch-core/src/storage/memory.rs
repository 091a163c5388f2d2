//! In-memory store for tests and ephemeral hosts

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::KeyValueStore;
use crate::error::{Error, Result};

const UNLIMITED_WRITES: usize = usize::MAX;

/// `HashMap`-backed store; clones share the same map.
///
/// Writes can be made to fail on demand to exercise persistence error paths.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    remaining_writes: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            remaining_writes: Arc::new(AtomicUsize::new(UNLIMITED_WRITES)),
            writes: Arc::default(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`delete` fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        let remaining = if fail { 0 } else { UNLIMITED_WRITES };
        self.remaining_writes.store(remaining, Ordering::SeqCst);
    }

    /// Let the next `count` writes through, then fail every later one
    pub fn fail_writes_after(&self, count: usize) {
        self.remaining_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a raw value, bypassing the async interface
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    fn check_writable(&self) -> Result<()> {
        self.remaining_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                match remaining {
                    0 => None,
                    UNLIMITED_WRITES => Some(UNLIMITED_WRITES),
                    remaining => Some(remaining - 1),
                }
            })
            .map(|_| ())
            .map_err(|_| Error::persistence("memory store rejected write"))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::persistence("memory store lock poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        self.lock()?.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.lock()?.remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
