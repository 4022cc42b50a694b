//! Songplay ETL - loads song and listening event data into a star schema
//!
//! Provides:
//! - Table catalog and SQL rendering for Redshift and DuckDB
//! - Staging loads (Redshift COPY from S3, or local JSON files into DuckDB)
//! - Dependency-ordered pipeline of schema, staging and transform steps
//! - TOML configuration with environment overrides

pub mod catalog;
pub mod ingest;
pub mod pipeline;
pub mod warehouse;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use catalog::{BulkLoad, Dialect, JsonFormat, Table, TransformQuery};
pub use ingest::{IngestError, IngestStats};
pub use pipeline::{Pipeline, RunOptions, RunReport, Stage, Step, StepAction};
pub use warehouse::{
    EtlConfig, QueryResult, Warehouse, WarehouseBackendType, WarehouseError, WarehouseResult,
    connect,
};

#[cfg(feature = "duckdb-backend")]
pub use warehouse::DuckDbWarehouse;
#[cfg(feature = "postgres-backend")]
pub use warehouse::RedshiftWarehouse;
