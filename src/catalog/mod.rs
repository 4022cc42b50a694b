//! Warehouse schema and query catalog
//!
//! Everything the pipeline executes is defined here as data:
//! - `tables`: star schema and staging table definitions, rendered to DDL
//! - `copy`: bulk-load (COPY) statements for the staging tables
//! - `transform`: the statements that populate dimensions and facts
//!
//! Statements are rendered for a [`Dialect`], so the same catalog runs on
//! Redshift and on an embedded DuckDB database.

pub mod copy;
pub mod tables;
pub mod transform;

pub use copy::{BulkLoad, JsonFormat};
pub use tables::{
    ColumnDef, ColumnType, DistStyle, Table, TableDef, create_table_queries, drop_table_queries,
};
pub use transform::{TransformQuery, insert_table_queries};

use serde::{Deserialize, Serialize};

/// SQL flavour a statement is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Amazon Redshift (default)
    #[default]
    Redshift,
    /// DuckDB embedded database
    DuckDb,
}

impl Dialect {
    /// Expression converting an epoch-milliseconds column into a timestamp
    pub fn epoch_millis_to_timestamp(&self, column: &str) -> String {
        match self {
            Dialect::Redshift => {
                format!("TIMESTAMP 'epoch' + {} * INTERVAL '0.001 second'", column)
            }
            Dialect::DuckDb => format!("epoch_ms(CAST({} AS BIGINT))", column),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redshift" => Ok(Dialect::Redshift),
            "duckdb" => Ok(Dialect::DuckDb),
            _ => Err(format!(
                "Unknown SQL dialect: {}. Use 'redshift' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Redshift => write!(f, "redshift"),
            Dialect::DuckDb => write!(f, "duckdb"),
        }
    }
}
