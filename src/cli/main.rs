//! CLI binary entry point for songplay-etl

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use songplay_etl::cli::commands::init::{InitArgs, handle_init};
use songplay_etl::cli::commands::query::{QueryArgs, handle_query};
use songplay_etl::cli::commands::run::{RunArgs, handle_run};
use songplay_etl::cli::commands::setup::{SetupArgs, handle_setup};
use songplay_etl::cli::commands::sql::{SqlArgs, handle_sql};
use songplay_etl::warehouse::config::CONFIG_FILENAME;

#[derive(Parser)]
#[command(name = "songplay-etl")]
#[command(about = "Load song and event data into a Redshift star schema")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Log at debug level, including every statement
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the staging tables and populate the star schema (default)
    Run {
        /// Drop and recreate all tables first
        #[arg(long)]
        reset: bool,
        /// Run all steps in a single transaction
        #[arg(long)]
        transactional: bool,
    },
    /// Drop and create all tables
    Setup {
        /// Keep existing tables, only create missing ones
        #[arg(long)]
        keep: bool,
    },
    /// Print the SQL a run would execute without connecting
    Sql {
        /// Only print one stage (teardown, schema, staging, transform)
        #[arg(short, long)]
        stage: Option<String>,
        /// Include teardown and schema statements
        #[arg(long)]
        reset: bool,
    },
    /// Run an ad-hoc query against the warehouse
    Query {
        /// SQL query to execute
        sql: String,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Write a sample configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let config = cli.config;

    match cli.command.unwrap_or(Commands::Run {
        reset: false,
        transactional: false,
    }) {
        Commands::Run {
            reset,
            transactional,
        } => handle_run(&RunArgs {
            config,
            reset,
            transactional,
        })?,
        Commands::Setup { keep } => handle_setup(&SetupArgs { config, keep })?,
        Commands::Sql { stage, reset } => handle_sql(&SqlArgs {
            config,
            stage,
            reset,
        })?,
        Commands::Query { sql, format } => handle_query(&QueryArgs {
            sql,
            config,
            format,
        })?,
        Commands::Init { force } => handle_init(&InitArgs { config, force })?,
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = execute(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
