//! Run command: load staging tables and populate the star schema

use std::path::PathBuf;

use crate::cli::commands::{load_config, runtime};
use crate::cli::error::CliError;
use crate::pipeline::{Pipeline, RunOptions, RunReport};
use crate::warehouse::connect;

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    /// Drop and recreate all tables before loading
    pub reset: bool,
    /// Wrap the run in one transaction (overrides the config file)
    pub transactional: bool,
}

pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let pipeline = Pipeline::etl(&config, args.reset)?;

    let mut options = RunOptions::from_config(&config);
    options.transactional |= args.transactional;

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

pub(crate) fn print_report(report: &RunReport) {
    println!("Run {}", report.run_id);
    for step in &report.steps {
        println!(
            "  {:<24} {:>10} rows  {:>8.2}s",
            step.name,
            step.rows_affected,
            step.duration.as_secs_f64()
        );
    }
    println!(
        "{} steps, {} rows in {:.2}s",
        report.steps.len(),
        report.total_rows(),
        report.duration.as_secs_f64()
    );
}
