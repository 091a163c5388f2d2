//! Punch CLI - track work time from the terminal, offline first
//!
//! Every mutation lands in a local durable queue and is pushed with
//! `punch sync` once a remote endpoint is reachable.

mod cli;
mod commands;
mod config_profiles;
mod error;
mod http_transport;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::device::run_device;
use crate::commands::queue::run_queue;
use crate::commands::sync::run_sync;
use crate::commands::timer::run_timer;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("punch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Device => run_device(&db_path).await?,
        Commands::Queue { command } => run_queue(command, &db_path).await?,
        Commands::Sync { endpoint, json } => run_sync(endpoint.as_deref(), json, &db_path).await?,
        Commands::Timer { command } => run_timer(command, &db_path).await?,
        Commands::Config { command } => run_config(command)?,
    }

    Ok(())
}
