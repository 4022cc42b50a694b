//! Setup command: (re)create the warehouse tables

use std::path::PathBuf;

use crate::cli::commands::{load_config, run::print_report, runtime};
use crate::cli::error::CliError;
use crate::pipeline::{Pipeline, RunOptions};
use crate::warehouse::connect;

/// Setup command arguments
#[derive(Debug, Clone)]
pub struct SetupArgs {
    pub config: PathBuf,
    /// Create missing tables without dropping existing ones
    pub keep: bool,
}

pub fn handle_setup(args: &SetupArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let pipeline = Pipeline::setup(config.dialect(), !args.keep)?;
    let options = RunOptions::from_config(&config);

    let rt = runtime()?;
    let report = rt.block_on(async {
        let warehouse = connect(&config).await?;
        let result = pipeline.run(warehouse.as_ref(), options).await;
        warehouse.close().await?;
        result
    })?;

    print_report(&report);
    Ok(())
}
