use std::path::Path;
use std::sync::Arc;

use punch_core::{SyncReport, SyncStatus};

use crate::commands::common::open_core_with_config;
use crate::config_profiles::CliConfig;
use crate::error::CliError;
use crate::http_transport::HttpTransport;

pub async fn run_sync(
    endpoint: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = CliConfig::load().map_err(CliError::Config)?;
    let endpoint = config
        .resolve_endpoint(endpoint)
        .ok_or(CliError::SyncNotConfigured)?;
    let transport = HttpTransport::new(endpoint)?;
    tracing::debug!("Pushing mutations to {}", transport.mutations_url());

    let core = open_core_with_config(db_path, &config.sync, Some(Arc::new(transport))).await?;
    let report = core.sync_now().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_sync_report_lines(&report) {
        println!("{line}");
    }
    let status = core.queue_status().await;
    if status.total > 0 {
        println!(
            "{} mutation(s) still queued ({} awaiting conflict resolution)",
            status.total, status.conflicts
        );
    }
    Ok(())
}

pub fn format_sync_report_lines(report: &SyncReport) -> Vec<String> {
    match report.status {
        SyncStatus::AlreadyInProgress => return vec!["A sync is already running.".to_string()],
        SyncStatus::Offline => return vec!["Offline; nothing was pushed.".to_string()],
        SyncStatus::Completed => {}
    }

    let mut lines = vec![format!(
        "Sync completed: {} synced, {} failed, {} conflict(s)",
        report.synced, report.errors, report.conflicts
    )];
    for resolution in &report.resolutions {
        lines.push(format!(
            "  conflict {} {} [{}] -> {:?} ({})",
            resolution.entity_kind,
            resolution.entity_id,
            resolution.fields.join(", "),
            resolution.kind,
            resolution.policy
        ));
    }
    for item in &report.exhausted {
        lines.push(format!(
            "  dropped {} {} after {} attempts",
            item.entity_kind, item.entity_id, item.retry_count
        ));
    }
    lines
}
