//! Error types for local staging loads

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading source files for a staging load
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file pattern: {0}")]
    InvalidPattern(String),

    #[error("Source cannot be read locally: {0}")]
    UnsupportedSource(String),

    #[error("No files found for source: {0}")]
    NoFiles(String),

    #[error("Failed to parse JSON in {path} (record {record}): {error}")]
    JsonParse {
        path: PathBuf,
        record: usize,
        error: String,
    },

    #[error("Invalid JSON path expression: {0}")]
    InvalidJsonPath(String),

    #[error("jsonpaths file defines {found} paths but the table has {expected} columns")]
    JsonPathsMismatch { expected: usize, found: usize },
}
