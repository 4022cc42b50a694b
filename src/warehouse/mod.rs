//! Warehouse backend abstraction
//!
//! This module provides the connection layer the pipeline runs against:
//! - Redshift: the production target, reached over the PostgreSQL protocol
//! - DuckDB: embedded database for local runs and tests
//!
//! Both backends hold exactly one connection. Statements run in autocommit
//! mode, so each one is committed as soon as it succeeds, unless the caller
//! opened a transaction with [`Warehouse::begin`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod redshift;

pub mod config;
pub mod output;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbWarehouse;

#[cfg(feature = "postgres-backend")]
pub use self::redshift::RedshiftWarehouse;

pub use config::{EtlConfig, WarehouseBackendType};
pub use output::{OutputFormat, format_query_result};

use crate::catalog::{BulkLoad, Dialect};
use crate::ingest::IngestError;

/// Error type for warehouse operations
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Failed to connect to the warehouse
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Loading a staging table failed
    #[error("Bulk load failed: {0}")]
    BulkLoadFailed(String),

    /// Reading local source files failed
    #[error("Ingest failed: {0}")]
    Ingest(#[from] IngestError),

    /// Transaction control failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Config or report could not be serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline definition error (unknown dependency, cycle)
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A pipeline step failed
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<WarehouseError>,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// One result row, keyed by column name
pub type Row = serde_json::Value;

/// Rows returned by a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows touched by DML, when the backend reports it
    pub rows_affected: Option<u64>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
            execution_time_ms: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of a column in a row, null when absent
    pub fn value(&self, row: usize, column: &str) -> &serde_json::Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&serde_json::Value::Null)
    }

    /// First value of the first row
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        let column = self.columns.first()?;
        self.rows.first()?.get(column)
    }
}

/// Warehouse backend trait
///
/// All operations run on the backend's single connection, one at a time.
#[async_trait(?Send)]
pub trait Warehouse: Send + Sync {
    /// SQL dialect statements must be rendered in for this backend
    fn dialect(&self) -> Dialect;

    /// Execute one statement and return the number of rows affected
    ///
    /// Outside a transaction the statement is committed on success.
    async fn execute(&self, sql: &str) -> WarehouseResult<u64>;

    /// Execute a query and return its rows
    async fn execute_query(&self, sql: &str) -> WarehouseResult<QueryResult>;

    /// Load a staging table from external JSON files
    ///
    /// # Returns
    /// Number of rows loaded, when the backend reports it
    async fn bulk_load(&self, load: &BulkLoad) -> WarehouseResult<u64>;

    /// Open a transaction spanning subsequent statements
    async fn begin(&self) -> WarehouseResult<()>;

    /// Commit the open transaction
    async fn commit(&self) -> WarehouseResult<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> WarehouseResult<()>;

    /// Check if the warehouse is reachable
    async fn health_check(&self) -> WarehouseResult<bool> {
        let result = self.execute_query("SELECT 1 AS healthy").await?;
        Ok(result.scalar().is_some())
    }

    /// Backend type name ("redshift" or "duckdb")
    fn backend_type(&self) -> &'static str;

    /// Close the connection
    async fn close(&self) -> WarehouseResult<()>;
}

/// Open the warehouse described by the configuration
pub async fn connect(config: &EtlConfig) -> WarehouseResult<Box<dyn Warehouse>> {
    match config.warehouse.backend {
        WarehouseBackendType::Redshift => {
            #[cfg(feature = "postgres-backend")]
            {
                let warehouse = RedshiftWarehouse::connect(&config.cluster).await?;
                Ok(Box::new(warehouse))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(WarehouseError::ConfigError(
                    "Redshift backend not enabled. Build with --features postgres-backend"
                        .to_string(),
                ))
            }
        }
        WarehouseBackendType::DuckDb => {
            #[cfg(feature = "duckdb-backend")]
            {
                let path = &config.warehouse.path;
                let warehouse = if path.is_empty() || path == config::IN_MEMORY_PATH {
                    DuckDbWarehouse::in_memory()?
                } else {
                    DuckDbWarehouse::new(path)?
                };
                Ok(Box::new(warehouse))
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                Err(WarehouseError::ConfigError(
                    "DuckDB backend not enabled. Build with --features duckdb-backend".to_string(),
                ))
            }
        }
    }
}
