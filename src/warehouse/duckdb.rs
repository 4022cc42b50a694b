//! DuckDB warehouse backend implementation
//!
//! Runs the pipeline against an embedded database. Staging loads read JSON
//! files from the local filesystem instead of object storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::{QueryResult, Warehouse, WarehouseError, WarehouseResult};
use crate::catalog::{BulkLoad, Dialect};
use crate::ingest::{self, IngestStats, RecordMapper};

/// Embedded DuckDB warehouse, file-backed or in-memory
pub struct DuckDbWarehouse {
    /// `None` when in-memory
    db_path: Option<PathBuf>,
    connection: Mutex<duckdb::Connection>,
    /// Whether `begin` opened a transaction that is still pending
    in_transaction: AtomicBool,
}

impl DuckDbWarehouse {
    /// Open (or create) a database file
    pub fn new(db_path: impl AsRef<Path>) -> WarehouseResult<Self> {
        let path = db_path.as_ref();
        let connection = duckdb::Connection::open(path).map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;
        tracing::debug!("Opened DuckDB warehouse at {}", path.display());
        Ok(Self::with_connection(connection, Some(path.to_path_buf())))
    }

    /// Open a database that lives only as long as this value
    pub fn in_memory() -> WarehouseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to open in-memory DuckDB: {}", e))
        })?;
        Ok(Self::with_connection(connection, None))
    }

    fn with_connection(connection: duckdb::Connection, db_path: Option<PathBuf>) -> Self {
        Self {
            db_path,
            connection: Mutex::new(connection),
            in_transaction: AtomicBool::new(false),
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> WarehouseResult<std::sync::MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    fn execute_batch(&self, sql: &str) -> WarehouseResult<()> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| WarehouseError::QueryFailed(format!("Batch execute failed: {}", e)))
    }

    /// Read every source file and insert its records into the staging table
    fn load_files(
        conn: &duckdb::Connection,
        load: &BulkLoad,
        stats: &mut IngestStats,
    ) -> WarehouseResult<()> {
        let table = load.table.definition();
        let mapper = RecordMapper::new(table, &load.format)?;
        let files = ingest::discover_local_files(&load.source)?;

        let placeholders: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("CAST(? AS {})", c.ty.render(Dialect::DuckDb)))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            load.table.ident(),
            table.column_names().join(", "),
            placeholders.join(", ")
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| WarehouseError::BulkLoadFailed(format!("Prepare failed: {}", e)))?;

        for file in files {
            let records = ingest::parse_records(&file.path)?;
            for record in &records {
                let values = mapper.map(record);
                stmt.execute(duckdb::params_from_iter(values.iter()))
                    .map_err(|e| {
                        WarehouseError::BulkLoadFailed(format!(
                            "Failed to load record from {}: {}",
                            file.path.display(),
                            e
                        ))
                    })?;
            }

            stats.files_processed += 1;
            stats.records_ingested += records.len();
            stats.bytes_processed += file.size;
        }

        Ok(())
    }
}

/// Row as a JSON object keyed by column name
fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
    let object = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let value = row
                .get_ref(i)
                .map(value_to_json)
                .unwrap_or(serde_json::Value::Null);
            (name.clone(), value)
        })
        .collect();
    serde_json::Value::Object(object)
}

fn value_to_json(value: duckdb::types::ValueRef) -> serde_json::Value {
    use duckdb::types::{TimeUnit, ValueRef};
    use serde_json::Value;

    let float = |f: f64| serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number);

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => b.into(),
        ValueRef::TinyInt(i) => i.into(),
        ValueRef::SmallInt(i) => i.into(),
        ValueRef::Int(i) => i.into(),
        ValueRef::BigInt(i) => i.into(),
        ValueRef::UTinyInt(i) => i.into(),
        ValueRef::USmallInt(i) => i.into(),
        ValueRef::UInt(i) => i.into(),
        ValueRef::UBigInt(i) => i.into(),
        // i128 does not fit a JSON number
        ValueRef::HugeInt(i) => i.to_string().into(),
        ValueRef::Float(f) => float(f64::from(f)),
        ValueRef::Double(f) => float(f),
        ValueRef::Decimal(d) => d.to_string().into(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into(),
        ValueRef::Blob(bytes) => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(bytes).into()
        }
        ValueRef::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            chrono::DateTime::from_timestamp_micros(micros)
                .map_or(Value::Null, |ts| {
                    ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string().into()
                })
        }
        other => format!("{:?}", other).into(),
    }
}

#[async_trait(?Send)]
impl Warehouse for DuckDbWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        let conn = self.lock()?;
        let affected = conn
            .execute(sql, [])
            .map_err(|e| WarehouseError::QueryFailed(format!("Execute failed: {}", e)))?;
        Ok(affected as u64)
    }

    async fn execute_query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let start = Instant::now();
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| WarehouseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        // Column names are only known once the statement has run
        let mut result_rows = stmt
            .query([])
            .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;
        let columns = result_rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| WarehouseError::QueryFailed(format!("Failed to read row: {}", e)))?
        {
            rows.push(row_to_json(row, &columns));
        }

        Ok(QueryResult {
            columns,
            rows,
            rows_affected: None,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn bulk_load(&self, load: &BulkLoad) -> WarehouseResult<u64> {
        if !load.table.is_staging() {
            return Err(WarehouseError::InvalidInput(format!(
                "{} is not a staging table",
                load.table
            )));
        }

        let started = Instant::now();
        let mut stats = IngestStats::new();
        let conn = self.lock()?;

        // A load is one committed unit, like a COPY. Inside a caller's
        // transaction it simply joins it.
        let own_transaction = !self.in_transaction.load(Ordering::SeqCst);
        if own_transaction {
            conn.execute_batch("BEGIN TRANSACTION")
                .map_err(|e| WarehouseError::TransactionFailed(e.to_string()))?;
        }

        let result = Self::load_files(&conn, load, &mut stats);

        if own_transaction {
            match &result {
                Ok(()) => conn
                    .execute_batch("COMMIT")
                    .map_err(|e| WarehouseError::TransactionFailed(e.to_string()))?,
                Err(_) => {
                    if let Err(e) = conn.execute_batch("ROLLBACK") {
                        tracing::warn!("Rollback after failed load of {} failed: {}", load, e);
                    }
                }
            }
        }
        result?;

        stats.duration = started.elapsed();
        tracing::info!(
            "Loaded {} records from {} files into {} in {}",
            stats.records_ingested,
            stats.files_processed,
            load.table,
            stats.duration_string()
        );

        Ok(stats.records_ingested as u64)
    }

    async fn begin(&self) -> WarehouseResult<()> {
        if self.in_transaction.load(Ordering::SeqCst) {
            return Err(WarehouseError::TransactionFailed(
                "A transaction is already open".to_string(),
            ));
        }
        self.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| WarehouseError::TransactionFailed(e.to_string()))?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> WarehouseResult<()> {
        // A failed COMMIT still ends the transaction
        let result = self
            .execute_batch("COMMIT")
            .map_err(|e| WarehouseError::TransactionFailed(e.to_string()));
        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    async fn rollback(&self) -> WarehouseResult<()> {
        let result = self
            .execute_batch("ROLLBACK")
            .map_err(|e| WarehouseError::TransactionFailed(e.to_string()));
        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> WarehouseResult<()> {
        // The connection is closed when dropped
        Ok(())
    }
}
