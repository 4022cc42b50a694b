//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::warehouse::WarehouseError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Config file not found: {0}. Run 'songplay-etl init' to create one.")]
    ConfigNotFound(PathBuf),

    #[error("File already exists: {0}. Use --force to overwrite.")]
    FileExists(PathBuf),

    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}
