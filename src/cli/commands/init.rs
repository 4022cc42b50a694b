//! Init command: write a sample configuration file

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::warehouse::config::sample_config;

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Where to write the configuration
    pub config: PathBuf,
    /// Overwrite an existing file
    pub force: bool,
}

pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if args.config.exists() && !args.force {
        return Err(CliError::FileExists(args.config.clone()));
    }

    std::fs::write(&args.config, sample_config())
        .map_err(|e| CliError::FileWriteError(args.config.clone(), e.to_string()))?;

    println!("Wrote sample configuration to {}", args.config.display());
    println!("Edit the [cluster], [iam_role] and [s3] sections before running.");
    Ok(())
}
