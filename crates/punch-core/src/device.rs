//! Stable per-device identifier

use std::fmt;

use uuid::Uuid;

use crate::error::Result;
use crate::storage::{KeyValueStore, DEVICE_ID_KEY};
use crate::util::normalize_text_option;

/// Identifier tagging every mutation and timer authored on this device.
///
/// Created once and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Return the persisted identifier, generating and persisting one on first use.
    ///
    /// A failed write is returned to the caller; without a stable id the core
    /// cannot start.
    pub async fn get_or_create<S>(store: &S) -> Result<Self>
    where
        S: KeyValueStore + ?Sized,
    {
        if let Some(existing) = normalize_text_option(store.get(DEVICE_ID_KEY).await?) {
            return Ok(Self(existing));
        }

        let id = Uuid::now_v7().to_string();
        store.set(DEVICE_ID_KEY, &id).await?;
        tracing::info!("Generated new device identity {id}");
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
