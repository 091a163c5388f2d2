use std::path::PathBuf;

use clap::{Parser, Subcommand};
use punch_core::{ConflictPolicy, EntityKind, Operation};

#[derive(Parser)]
#[command(name = "punch")]
#[command(about = "Track work time offline and sync it when you can")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print this device's identifier
    Device,
    /// Inspect and edit the pending mutation queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Push pending mutations to the remote store
    Sync {
        /// Remote endpoint (overrides config and PUNCH_SYNC_ENDPOINT)
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
        /// Output the sync report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Control the background work timer
    Timer {
        #[command(subcommand)]
        command: TimerCommands,
    },
    /// Show or edit CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Queue a mutation
    Add {
        /// Entity kind (time_entry, mileage_entry, employee, project, task)
        entity_kind: EntityKind,
        /// Entity identifier
        entity_id: String,
        /// Operation (create, update, delete)
        operation: Operation,
        /// JSON payload
        #[arg(long, value_name = "JSON", default_value = "{}")]
        data: String,
        /// Higher priorities sync first
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        priority: i32,
        /// Conflict policy override for this mutation
        #[arg(long, value_name = "POLICY")]
        policy: Option<ConflictPolicy>,
        /// Coalesce with a pending mutation carrying the same key
        #[arg(long, value_name = "KEY")]
        idempotency_key: Option<String>,
    },
    /// List queued mutations
    List {
        /// Only show mutations waiting for a manual conflict decision
        #[arg(long)]
        conflicts: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a parked conflict by pushing a chosen payload
    Resolve {
        /// Queue item ID or unique ID prefix
        id: String,
        /// Payload to push (defaults to the queued local payload)
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },
    /// Drop a parked conflict and keep the remote version
    Discard {
        /// Queue item ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TimerCommands {
    /// Start a timer (stops and queues any running one first)
    Start {
        /// Project to book time against
        project_id: String,
        /// Optional task within the project
        #[arg(long, value_name = "ID")]
        task: Option<String>,
        /// Employee the time belongs to
        #[arg(long, value_name = "ID", env = "PUNCH_EMPLOYEE_ID")]
        employee: String,
        /// Hold a wake-lock while the timer runs
        #[arg(long)]
        battery_optimized: bool,
    },
    /// Pause the running timer
    Pause,
    /// Resume a paused timer
    Resume,
    /// Stop the timer and queue the time entry
    Stop,
    /// Show the current timer
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Initialize or update the configuration file
    Init {
        /// Remote sync endpoint
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
        /// Default conflict policy
        #[arg(long, value_name = "POLICY")]
        policy: Option<ConflictPolicy>,
        /// Retries before a mutation is dropped
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
        /// Mutations pushed per sync
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
    },
}
