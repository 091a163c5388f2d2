use punch_core::util::normalize_text_option;
use punch_core::ConflictPolicy;

use crate::cli::ConfigCommands;
use crate::config_profiles::{default_config_path, CliConfig, SYNC_ENDPOINT_ENV};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(),
        ConfigCommands::Init {
            endpoint,
            policy,
            max_retries,
            batch_size,
        } => run_config_init(endpoint, policy, max_retries, batch_size),
    }
}

fn run_config_show() -> Result<(), CliError> {
    let config = CliConfig::load().map_err(CliError::Config)?;
    println!("# {}", default_config_path().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Some(endpoint) = config.resolve_endpoint(None) {
        println!("# effective sync endpoint: {endpoint}");
    }
    Ok(())
}

fn run_config_init(
    endpoint: Option<String>,
    policy: Option<ConflictPolicy>,
    max_retries: Option<u32>,
    batch_size: Option<usize>,
) -> Result<(), CliError> {
    let config = CliConfig::load().map_err(CliError::Config)?;
    let config = merge_config(config, endpoint, policy, max_retries, batch_size)?;

    let path = config.save().map_err(CliError::Config)?;
    println!("Configuration written to {}", path.display());
    if config.sync_endpoint.is_none() {
        println!(
            "No sync endpoint set. Pass --endpoint or set {SYNC_ENDPOINT_ENV} before `punch sync`."
        );
    }
    Ok(())
}

/// Apply explicit values over `config`, falling back to the environment for
/// the endpoint.
pub fn merge_config(
    mut config: CliConfig,
    endpoint: Option<String>,
    policy: Option<ConflictPolicy>,
    max_retries: Option<u32>,
    batch_size: Option<usize>,
) -> Result<CliConfig, CliError> {
    if let Some(endpoint) = normalize_text_option(endpoint)
        .or_else(|| normalize_text_option(std::env::var(SYNC_ENDPOINT_ENV).ok()))
    {
        config.sync_endpoint = Some(endpoint.trim_end_matches('/').to_string());
    }
    if let Some(policy) = policy {
        config.sync = config.sync.with_default_policy(policy);
    }
    if let Some(max_retries) = max_retries {
        config.sync = config.sync.with_max_retries(max_retries);
    }
    if let Some(batch_size) = batch_size {
        config.sync = config.sync.with_batch_size(batch_size);
    }

    config.validate().map_err(CliError::Config)?;
    Ok(config)
}
