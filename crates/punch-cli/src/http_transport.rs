//! HTTP implementation of the remote mutation transport.
//!
//! Each queued mutation is POSTed as JSON to `{endpoint}/v1/mutations`. The
//! server answers 2xx when applied and 409 with its current record when the
//! target changed since the mutation was authored; anything else is treated
//! as transient so the item is retried.

use std::time::Duration;

use async_trait::async_trait;
use punch_core::util::normalize_text_option;
use punch_core::{ApplyOutcome, QueueItem, RemoteRecord, RemoteTransport};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_EXCERPT_CHARS: usize = 180;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid sync transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP client could not be built: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct HttpTransport {
    mutations_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        Ok(Self {
            mutations_url: format!("{endpoint}/v1/mutations"),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    pub fn mutations_url(&self) -> &str {
        &self.mutations_url
    }
}

#[derive(Debug, Serialize)]
struct MutationRequest<'a> {
    id: String,
    entity_kind: &'a str,
    entity_id: &'a str,
    operation: &'a str,
    data: &'a Value,
    created_at: i64,
    device_id: Option<&'a str>,
    force: bool,
    revision: u32,
}

impl<'a> From<&'a QueueItem> for MutationRequest<'a> {
    fn from(item: &'a QueueItem) -> Self {
        Self {
            id: item.id.to_string(),
            entity_kind: item.entity_kind.as_str(),
            entity_id: &item.entity_id,
            operation: item.operation.as_str(),
            data: &item.data,
            created_at: item.created_at,
            device_id: item.device_id.as_deref(),
            force: item.force,
            revision: item.revision,
        }
    }
}

/// Server's current version of a conflicting record
#[derive(Debug, Deserialize)]
struct ConflictBody {
    #[serde(alias = "remote", alias = "record")]
    data: Value,
    #[serde(alias = "updatedAt")]
    updated_at: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn apply(&self, item: &QueueItem) -> ApplyOutcome {
        let response = match self
            .client
            .post(&self.mutations_url)
            .header("Accept", "application/json")
            .header("Idempotency-Key", idempotency_key(item))
            .json(&MutationRequest::from(item))
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return ApplyOutcome::TransientError(error_excerpt(&error.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            return ApplyOutcome::Applied;
        }

        let body = response.text().await.unwrap_or_default();
        classify_response(status, &body)
    }
}

fn classify_response(status: StatusCode, body: &str) -> ApplyOutcome {
    if status == StatusCode::CONFLICT {
        return match serde_json::from_str::<ConflictBody>(body) {
            Ok(conflict) => ApplyOutcome::Conflict(RemoteRecord {
                data: conflict.data,
                updated_at: conflict.updated_at,
            }),
            Err(error) => ApplyOutcome::TransientError(format!(
                "unreadable conflict payload ({}): {error}",
                status.as_u16()
            )),
        };
    }

    ApplyOutcome::TransientError(parse_api_error(status, body))
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", error_excerpt(&message), status.as_u16());
        }
    }

    let trimmed = error_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Each coalesced revision of an item is a distinct delivery for the server.
fn idempotency_key(item: &QueueItem) -> String {
    if item.revision == 0 {
        item.id.to_string()
    } else {
        format!("{}.r{}", item.id, item.revision)
    }
}

/// Only plain HTTP(S) endpoints can carry the mutation API
pub fn is_http_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("http://") || endpoint.starts_with("https://")
}

fn error_excerpt(text: &str) -> String {
    text.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

fn normalize_endpoint(raw: String) -> Result<String, TransportError> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("endpoint must not be empty".to_string())
    })?;
    if is_http_endpoint(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}
