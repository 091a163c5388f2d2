//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use punch_core::util::normalize_text_option;
use punch_core::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::http_transport::is_http_endpoint;

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const SYNC_ENDPOINT_ENV: &str = "PUNCH_SYNC_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Remote endpoint mutations are pushed to
    #[serde(default)]
    pub sync_endpoint: Option<String>,
    #[serde(default)]
    pub sync: SyncConfig,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("punch")
        .join(CONFIG_FILE_NAME)
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized.validate()?;
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Endpoint precedence: explicit flag, then environment, then file.
    pub fn resolve_endpoint(&self, explicit: Option<&str>) -> Option<String> {
        normalize_text_option(explicit.map(ToString::to_string))
            .or_else(|| normalize_text_option(std::env::var(SYNC_ENDPOINT_ENV).ok()))
            .or_else(|| normalize_text_option(self.sync_endpoint.clone()))
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = self.sync_endpoint.as_deref() {
            if !is_http_endpoint(endpoint) {
                return Err("sync_endpoint must include http:// or https://".to_string());
            }
        }
        self.sync.validate().map_err(|error| error.to_string())
    }

    fn normalize(&mut self) {
        self.sync_endpoint = normalize_text_option(self.sync_endpoint.clone())
            .map(|endpoint| endpoint.trim_end_matches('/').to_string());
    }
}
