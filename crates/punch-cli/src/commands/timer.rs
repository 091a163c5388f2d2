use std::path::Path;

use punch_core::{BackgroundTimerState, HeartbeatStatus, TimerPhase};
use serde::Serialize;

use crate::cli::TimerCommands;
use crate::commands::common::{format_elapsed, format_timestamp, open_core};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct TimerStatusOutput {
    state: Option<BackgroundTimerState>,
    heartbeat: HeartbeatStatus,
}

pub async fn run_timer(command: TimerCommands, db_path: &Path) -> Result<(), CliError> {
    let core = open_core(db_path, None).await?;

    match command {
        TimerCommands::Start {
            project_id,
            task,
            employee,
            battery_optimized,
        } => {
            let state = core
                .start_timer(&project_id, task.as_deref(), &employee, battery_optimized)
                .await?;
            println!("Timer started for project {}", state.project_id);
        }
        TimerCommands::Pause => {
            let state = core.pause_timer().await?;
            println!("Timer paused at {}", format_elapsed(state.elapsed_seconds));
        }
        TimerCommands::Resume => {
            let state = core.resume_timer().await?;
            println!("Timer resumed at {}", format_elapsed(state.elapsed_seconds));
        }
        TimerCommands::Stop => {
            let completed = core.stop_timer().await?;
            println!(
                "Timer stopped after {}; queued time entry {}",
                format_elapsed(completed.elapsed_seconds),
                completed.item.id
            );
        }
        TimerCommands::Status { json } => {
            let state = core.timer_state().await;
            let heartbeat = core.heartbeat_status().await;
            if json {
                let output = TimerStatusOutput { state, heartbeat };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", format_timer_status(state.as_ref()));
            }
        }
    }

    Ok(())
}

pub fn format_timer_status(state: Option<&BackgroundTimerState>) -> String {
    let Some(state) = state else {
        return "No timer running.".to_string();
    };

    let phase = match state.phase() {
        TimerPhase::Running => "Running",
        TimerPhase::Paused => "Paused",
        TimerPhase::Stopped => "Stopped",
    };
    let task = state
        .task_id
        .as_deref()
        .map(|task| format!(" / {task}"))
        .unwrap_or_default();

    format!(
        "{phase}  {}{task}  {}  (started {})",
        state.project_id,
        format_elapsed(state.elapsed_seconds),
        format_timestamp(state.started_at)
    )
}
