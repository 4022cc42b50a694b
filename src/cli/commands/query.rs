//! SQL query CLI command
//!
//! Runs an ad-hoc query against the configured warehouse.

use std::path::PathBuf;

use crate::cli::commands::{load_config, runtime};
use crate::cli::error::CliError;
use crate::warehouse::{OutputFormat, connect, format_query_result};

/// Query command arguments
#[derive(Debug, Clone)]
pub struct QueryArgs {
    /// SQL query to execute
    pub sql: String,
    pub config: PathBuf,
    /// Output format
    pub format: String,
}

/// Execute a SQL query against the warehouse
pub fn handle_query(args: &QueryArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;

    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let rt = runtime()?;
    let result = rt.block_on(async {
        let warehouse = connect(&config).await?;
        let result = warehouse.execute_query(&args.sql).await;
        warehouse.close().await?;
        result
    })?;

    println!("{}", format_query_result(&result, output_format));

    // Print execution time for non-JSON formats
    if output_format != OutputFormat::Json {
        eprintln!("\nExecution time: {}ms", result.execution_time_ms);
    }

    Ok(())
}
