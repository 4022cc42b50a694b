//! Redshift warehouse backend implementation
//!
//! Redshift speaks the PostgreSQL wire protocol, so the backend is a single
//! tokio-postgres client. Statements go through the simple query protocol,
//! which is what Redshift's COPY and multi-row DML expect.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_postgres::SimpleQueryMessage;

use super::config::ClusterSection;
use super::{QueryResult, Warehouse, WarehouseError, WarehouseResult};
use crate::catalog::{BulkLoad, Dialect};

/// Redshift warehouse backend
pub struct RedshiftWarehouse {
    /// Host and database, for log messages
    target: String,
    /// PostgreSQL client (wrapped for async access)
    client: Arc<Mutex<tokio_postgres::Client>>,
    /// Whether `begin` opened a transaction that is still pending
    in_transaction: AtomicBool,
}

impl RedshiftWarehouse {
    /// Connect to the cluster
    pub async fn connect(cluster: &ClusterSection) -> WarehouseResult<Self> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&cluster.host)
            .dbname(&cluster.dbname)
            .user(&cluster.user)
            .password(&cluster.password)
            .port(cluster.port);

        let target = format!("{}:{}/{}", cluster.host, cluster.port, cluster.dbname);

        let (client, connection) = config
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| {
                WarehouseError::ConnectionFailed(format!(
                    "Failed to connect to {}: {}",
                    target, e
                ))
            })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Redshift connection error: {}", e);
            }
        });

        tracing::info!("Connected to {}", target);

        Ok(Self {
            target,
            client: Arc::new(Mutex::new(client)),
            in_transaction: AtomicBool::new(false),
        })
    }

    /// Host, port and database of the connection
    pub fn target(&self) -> &str {
        &self.target
    }

    async fn simple_query(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>, tokio_postgres::Error> {
        let client = self.client.lock().await;
        client.simple_query(sql).await
    }

    fn rows_affected(messages: &[SimpleQueryMessage]) -> u64 {
        messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum()
    }
}

#[async_trait(?Send)]
impl Warehouse for RedshiftWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        let messages = self
            .simple_query(sql)
            .await
            .map_err(|e| WarehouseError::QueryFailed(format!("Execute failed: {}", e)))?;
        Ok(Self::rows_affected(&messages))
    }

    async fn execute_query(&self, sql: &str) -> WarehouseResult<QueryResult> {
        let start = Instant::now();
        let messages = self
            .simple_query(sql)
            .await
            .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();

        for message in &messages {
            if let SimpleQueryMessage::Row(row) = message {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }

                let mut map = serde_json::Map::new();
                for (i, name) in columns.iter().enumerate() {
                    let value = row
                        .get(i)
                        .map(|v| serde_json::Value::String(v.to_string()))
                        .unwrap_or(serde_json::Value::Null);
                    map.insert(name.clone(), value);
                }
                rows.push(serde_json::Value::Object(map));
            }
        }

        Ok(QueryResult {
            columns,
            rows,
            rows_affected: Some(Self::rows_affected(&messages)),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn bulk_load(&self, load: &BulkLoad) -> WarehouseResult<u64> {
        let messages = self
            .simple_query(&load.to_copy_sql())
            .await
            .map_err(|e| WarehouseError::BulkLoadFailed(format!("{}: {}", load, e)))?;
        Ok(Self::rows_affected(&messages))
    }

    async fn begin(&self) -> WarehouseResult<()> {
        if self.in_transaction.load(Ordering::SeqCst) {
            return Err(WarehouseError::TransactionFailed(
                "A transaction is already open".to_string(),
            ));
        }
        self.simple_query("BEGIN")
            .await
            .map_err(|e| WarehouseError::TransactionFailed(e.to_string()))?;
        self.in_transaction.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> WarehouseResult<()> {
        // A failed COMMIT still ends the transaction on the server
        let result = self
            .simple_query("COMMIT")
            .await
            .map(|_| ())
            .map_err(|e| WarehouseError::TransactionFailed(e.to_string()));
        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    async fn rollback(&self) -> WarehouseResult<()> {
        let result = self
            .simple_query("ROLLBACK")
            .await
            .map(|_| ())
            .map_err(|e| WarehouseError::TransactionFailed(e.to_string()));
        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }

    fn backend_type(&self) -> &'static str {
        "redshift"
    }

    async fn close(&self) -> WarehouseResult<()> {
        // The connection task ends when the client is dropped
        tracing::debug!("Closing connection to {}", self.target);
        Ok(())
    }
}
