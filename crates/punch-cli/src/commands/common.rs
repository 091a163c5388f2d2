use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use punch_core::storage::SqliteStore;
use punch_core::{PunchCore, QueueItem, QueueItemId, RemoteTransport, SyncConfig};
use serde::Serialize;
use serde_json::Value;

use crate::config_profiles::CliConfig;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct QueueListItem {
    pub id: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub operation: String,
    pub priority: i32,
    pub retry_count: u32,
    pub status: String,
    pub created_at: i64,
    pub relative_time: String,
    pub data: Value,
}

pub fn queue_item_to_list_item(item: &QueueItem) -> QueueListItem {
    let now_ms = Utc::now().timestamp_millis();
    QueueListItem {
        id: item.id.to_string(),
        entity_kind: item.entity_kind.to_string(),
        entity_id: item.entity_id.clone(),
        operation: item.operation.to_string(),
        priority: item.priority,
        retry_count: item.retry_count,
        status: queue_item_status(item).to_string(),
        created_at: item.created_at,
        relative_time: format_relative_time(item.created_at, now_ms),
        data: item.data.clone(),
    }
}

fn queue_item_status(item: &QueueItem) -> &'static str {
    if item.is_conflicted() {
        "conflict"
    } else {
        "pending"
    }
}

pub fn format_queue_lines(items: &[QueueItem]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    items
        .iter()
        .map(|item| {
            let id = item.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let target = format!("{} {}", item.entity_kind, item.entity_id);
            let relative_time = format_relative_time(item.created_at, now_ms);
            let mut line = format!(
                "{short_id:<13}  {:<8}  {:<6}  {target:<40}  p={:<3}  {relative_time}",
                queue_item_status(item),
                item.operation,
                item.priority
            );
            if item.retry_count > 0 {
                line.push_str(&format!("  retries={}", item.retry_count));
            }
            line
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

/// `1h 05m 09s` style rendering of an elapsed duration
pub fn format_elapsed(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

pub fn parse_json_payload(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

pub fn normalize_queue_item_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyQueueItemId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Find a queued item by full id or unique id prefix
pub fn resolve_queue_item(query: &str, items: &[QueueItem]) -> Result<QueueItem, CliError> {
    let query = normalize_queue_item_identifier(query)?;
    if let Ok(id) = query.parse::<QueueItemId>() {
        if let Some(item) = items.iter().find(|item| item.id == id) {
            return Ok(item.clone());
        }
    }

    let matches = items
        .iter()
        .filter(|item| item.id.to_string().starts_with(&query))
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::QueueItemNotFound(query)),
        [item] => Ok((*item).clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|item| item.id.to_string().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousQueueItemId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("PUNCH_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("punch")
        .join("punch.db")
}

/// Open the local core with the on-disk CLI configuration.
pub async fn open_core(
    db_path: &Path,
    transport: Option<Arc<dyn RemoteTransport>>,
) -> Result<PunchCore, CliError> {
    let config = CliConfig::load().map_err(CliError::Config)?;
    open_core_with_config(db_path, &config.sync, transport).await
}

/// Open the local core.
///
/// The CLI is short-lived, so automatic sync is always off; pushing happens
/// only through `punch sync`.
pub async fn open_core_with_config(
    db_path: &Path,
    sync_config: &SyncConfig,
    transport: Option<Arc<dyn RemoteTransport>>,
) -> Result<PunchCore, CliError> {
    let store = SqliteStore::open(db_path)?;

    let mut builder = PunchCore::builder(Arc::new(store))
        .with_sync_config(sync_config.clone().without_auto_sync());
    if let Some(transport) = transport {
        builder = builder.with_transport(transport);
    }
    Ok(builder.open().await?)
}
