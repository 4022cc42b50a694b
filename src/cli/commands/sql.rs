//! Sql command: print the statements a run would execute

use std::path::PathBuf;

use crate::cli::commands::load_config_unchecked;
use crate::cli::error::CliError;
use crate::pipeline::{Pipeline, Stage};

/// Sql command arguments
#[derive(Debug, Clone)]
pub struct SqlArgs {
    pub config: PathBuf,
    /// Only print steps of this stage
    pub stage: Option<String>,
    /// Include teardown and schema steps
    pub reset: bool,
}

pub fn handle_sql(args: &SqlArgs) -> Result<(), CliError> {
    let config = load_config_unchecked(&args.config)?;

    let mut pipeline = Pipeline::etl(&config, args.reset || args.stage.is_some())?;
    if let Some(stage) = &args.stage {
        let stage: Stage = stage.parse().map_err(CliError::InvalidArgument)?;
        pipeline = pipeline.only(stage);
    }

    print!("{}", render_pipeline(&pipeline));
    Ok(())
}

/// Pipeline as a SQL script, one commented block per step
pub fn render_pipeline(pipeline: &Pipeline) -> String {
    let mut output = String::new();
    for step in pipeline.steps() {
        output.push_str(&format!("-- {} / {}\n", step.stage, step.name));
        for statement in step.statements() {
            output.push_str(statement.trim());
            output.push_str(";\n");
        }
        output.push('\n');
    }
    output
}
