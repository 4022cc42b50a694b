//! CLI command implementations

pub mod init;
pub mod query;
pub mod run;
pub mod setup;
pub mod sql;

use std::path::Path;

use crate::cli::error::CliError;
use crate::warehouse::EtlConfig;

/// Load and validate the configuration file
pub fn load_config(path: &Path) -> Result<EtlConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound(path.to_path_buf()));
    }
    Ok(EtlConfig::load(path)?)
}

/// Load the configuration without validating it
///
/// Enough for rendering SQL, which never connects.
pub fn load_config_unchecked(path: &Path) -> Result<EtlConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let mut config = EtlConfig::parse(&content)?;
    config.apply_env_overrides();
    Ok(config)
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}
