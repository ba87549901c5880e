//! Write side of a transfer: where rows go.
//!
//! The target always owns the table it writes: the existing table is
//! dropped and recreated from the stream's schema, so repeated transfers
//! are idempotent. How rows land depends on the backend:
//!
//! - **Bulk** (PostgreSQL, Snowflake): the driver creates the table and
//!   loads the whole stream through its fastest path in one call.
//! - **Incremental** (SQL Server, unknown backends): the schema is ensured,
//!   the table is dropped and recreated, then each batch is appended with a
//!   parameterized insert.

use tracing::info;

use crate::core::{BackendKind, Endpoint, QualifiedName, RecordBatchStream};
use crate::dialect;
use crate::drivers::{self, Driver};
use crate::error::{Result, TransferError};
use crate::typemap;

/// Schema ensured for unqualified target tables, so a bare table name
/// still lands somewhere predictable on backends with schema support.
pub const DEFAULT_STAGING_SCHEMA: &str = "staging";

/// How rows are written to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// One driver call creates the table and loads the whole stream.
    Bulk,
    /// Drop, recreate, then append batch by batch.
    Incremental,
}

/// Write strategy for a backend kind.
pub fn write_strategy(kind: &BackendKind) -> WriteStrategy {
    match kind {
        BackendKind::Postgres | BackendKind::Snowflake => WriteStrategy::Bulk,
        BackendKind::SqlServer | BackendKind::Other(_) => WriteStrategy::Incremental,
    }
}

/// A table on a backend that a stream is written into.
#[derive(Clone)]
pub struct Target {
    endpoint: Endpoint,
    table: QualifiedName,
}

impl Target {
    pub fn new(endpoint: Endpoint, table: impl Into<QualifiedName>) -> Result<Self> {
        let table = table.into();
        if table.table().is_empty() {
            return Err(TransferError::Config(
                "target table name is empty".to_string(),
            ));
        }
        Ok(Self { endpoint, table })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// Write the stream into the target table. Returns rows written.
    pub async fn ingest(&self, stream: RecordBatchStream) -> Result<u64> {
        let driver = drivers::connect_writer(&self.endpoint);
        self.ingest_with_driver(driver.as_ref(), stream).await
    }

    /// Write through an explicit driver instead of the dispatch table.
    pub async fn ingest_with_driver(
        &self,
        driver: &dyn Driver,
        mut stream: RecordBatchStream,
    ) -> Result<u64> {
        let kind = self.endpoint.kind();
        let strategy = write_strategy(kind);
        info!(target = %self.summary(), ?strategy, "writing target");

        match strategy {
            WriteStrategy::Bulk => {
                driver
                    .execute_statement(&dialect::drop_table_sql(&self.table))
                    .await?;
                let ddl = typemap::create_table_sql(&self.table, stream.schema(), kind);
                driver.bulk_ingest(&self.table, &ddl, stream).await
            }
            WriteStrategy::Incremental => {
                let schema_name = self.table.schema().unwrap_or(DEFAULT_STAGING_SCHEMA);
                driver
                    .execute_statement(&dialect::ensure_schema_sql(schema_name, kind))
                    .await?;
                driver
                    .execute_statement(&dialect::drop_table_sql(&self.table))
                    .await?;
                let table_schema = stream.schema().clone();
                driver
                    .execute_statement(&typemap::create_table_sql(&self.table, &table_schema, kind))
                    .await?;

                let mut total = 0u64;
                while let Some(batch) = stream.next_batch().await {
                    let batch = batch?;
                    total += driver
                        .insert_batch(&self.table, &table_schema, batch.to_rows())
                        .await?;
                }
                Ok(total)
            }
        }
    }

    /// One-line description for plan summaries and logs.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.endpoint.display_name(), self.table.quoted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_per_backend() {
        assert_eq!(write_strategy(&BackendKind::Postgres), WriteStrategy::Bulk);
        assert_eq!(write_strategy(&BackendKind::Snowflake), WriteStrategy::Bulk);
        assert_eq!(
            write_strategy(&BackendKind::SqlServer),
            WriteStrategy::Incremental
        );
        assert_eq!(
            write_strategy(&BackendKind::Other("duckdb".to_string())),
            WriteStrategy::Incremental
        );
    }

    #[test]
    fn test_empty_table_name_rejected() {
        let result = Target::new(Endpoint::from("postgresql://h/db"), "\"\"");
        assert!(matches!(result, Err(TransferError::Config(_))));
    }

    #[test]
    fn test_summary() {
        let target = Target::new(Endpoint::from("Driver={X};Server=h;"), "staging.users").unwrap();
        assert_eq!(
            target.summary(),
            "sqlserver_connection: \"staging\".\"users\""
        );
    }
}
