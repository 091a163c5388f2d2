//! Key-value persistence capability.
//!
//! Everything the core persists (device id, queue, timer state) is a JSON
//! document stored under one of the keys below. Backends only need
//! `get`/`set`/`delete`.

mod memory;
mod migrations;
mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage key of the device identifier
pub const DEVICE_ID_KEY: &str = "device_id";
/// Storage key of the mutation queue
pub const SYNC_QUEUE_KEY: &str = "sync_queue";
/// Storage key of the background timer state
pub const TIMER_STATE_KEY: &str = "background_timer";

/// Minimal async key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a JSON document
pub async fn load_json<T, S>(store: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON document
pub async fn save_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + Sync,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
