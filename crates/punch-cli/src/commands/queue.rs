use std::path::Path;

use punch_core::{
    ConflictPolicy, EntityKind, NewMutation, Operation, PunchCore, QueueItem, QueueStatus,
};

use crate::cli::QueueCommands;
use crate::commands::common::{
    format_queue_lines, open_core, parse_json_payload, queue_item_to_list_item,
    resolve_queue_item, QueueListItem,
};
use crate::error::CliError;

pub async fn run_queue(command: QueueCommands, db_path: &Path) -> Result<(), CliError> {
    let core = open_core(db_path, None).await?;

    match command {
        QueueCommands::Add {
            entity_kind,
            entity_id,
            operation,
            data,
            priority,
            policy,
            idempotency_key,
        } => {
            let mutation = build_mutation(
                entity_kind,
                &entity_id,
                operation,
                &data,
                priority,
                policy,
                idempotency_key,
            )?;
            let item = core.enqueue(mutation).await?;
            println!("{}", item.id);
        }
        QueueCommands::List { conflicts, json } => {
            let items = if conflicts {
                core.conflicts().await
            } else {
                core.queue_items().await
            };
            print_queue_items(&items, json)?;
        }
        QueueCommands::Status { json } => {
            let status = core.queue_status().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", format_queue_status(&status));
            }
        }
        QueueCommands::Resolve { id, data } => {
            let item = resolve_conflict(&core, &id, data.as_deref()).await?;
            println!("Resolved {}; it will be pushed on the next sync", item.id);
        }
        QueueCommands::Discard { id } => {
            let item = discard_conflict(&core, &id).await?;
            println!("Discarded {} ({} {})", item.id, item.entity_kind, item.entity_id);
        }
    }

    Ok(())
}

pub fn build_mutation(
    entity_kind: EntityKind,
    entity_id: &str,
    operation: Operation,
    data: &str,
    priority: i32,
    policy: Option<ConflictPolicy>,
    idempotency_key: Option<String>,
) -> Result<NewMutation, CliError> {
    let mut mutation = NewMutation::new(
        entity_kind,
        entity_id.trim(),
        operation,
        parse_json_payload(data)?,
    )
    .with_priority(priority);
    if let Some(policy) = policy {
        mutation = mutation.with_policy(policy);
    }
    if let Some(key) = punch_core::util::normalize_text_option(idempotency_key) {
        mutation = mutation.with_idempotency_key(key);
    }
    Ok(mutation)
}

/// Push either the given payload or the queued local one over the remote
pub async fn resolve_conflict(
    core: &PunchCore,
    id_query: &str,
    data: Option<&str>,
) -> Result<QueueItem, CliError> {
    let item = resolve_queue_item(id_query, &core.conflicts().await)?;
    let payload = match data {
        Some(raw) => parse_json_payload(raw)?,
        None => item.data.clone(),
    };
    Ok(core.resolve_conflict(&item.id, payload).await?)
}

pub async fn discard_conflict(core: &PunchCore, id_query: &str) -> Result<QueueItem, CliError> {
    let item = resolve_queue_item(id_query, &core.conflicts().await)?;
    Ok(core.discard_conflict(&item.id).await?)
}

fn print_queue_items(items: &[QueueItem], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json_items = items
            .iter()
            .map(queue_item_to_list_item)
            .collect::<Vec<QueueListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(items) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_queue_status(status: &QueueStatus) -> String {
    format!(
        "{} queued ({} pending, {} awaiting conflict resolution)",
        status.total, status.pending, status.conflicts
    )
}
