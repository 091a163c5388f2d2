use std::path::Path;

use crate::commands::common::open_core;
use crate::error::CliError;

pub async fn run_device(db_path: &Path) -> Result<(), CliError> {
    let core = open_core(db_path, None).await?;
    println!("{}", core.device_id());
    Ok(())
}
