//! Read side of a transfer: where rows come from.
//!
//! A [`Source`] is either a table on a database backend or an in-memory
//! table. Database sources resolve to a driver through the dispatch layer
//! and stream their rows; memory tables chunk themselves into batches
//! directly.

use tracing::info;

use crate::core::{Endpoint, MemoryTable, QualifiedName, RecordBatchStream};
use crate::dialect;
use crate::drivers::{self, Driver, FetchOptions};
use crate::error::{Result, TransferError};

/// A table on a database backend.
#[derive(Clone)]
pub struct DatabaseSource {
    endpoint: Endpoint,
    table: QualifiedName,
}

impl DatabaseSource {
    pub fn new(endpoint: Endpoint, table: impl Into<QualifiedName>) -> Result<Self> {
        let table = table.into();
        if table.table().is_empty() {
            return Err(TransferError::Config(
                "source table name is empty".to_string(),
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

    /// The select statement that reads the whole table.
    fn select_sql(&self, limit: Option<u64>) -> String {
        let sql = format!("select * from {}", self.table.quoted());
        match limit {
            Some(n) => dialect::apply_row_limit(&sql, n, self.endpoint.kind()),
            None => sql,
        }
    }
}

/// Where the rows of a transfer come from.
pub enum Source {
    Database(DatabaseSource),
    Memory(MemoryTable),
}

impl Source {
    /// Database-table source on `endpoint`.
    pub fn table(endpoint: Endpoint, table: impl Into<QualifiedName>) -> Result<Self> {
        Ok(Source::Database(DatabaseSource::new(endpoint, table)?))
    }

    /// In-memory source.
    pub fn memory(table: MemoryTable) -> Self {
        Source::Memory(table)
    }

    /// Stream every row of the source.
    pub async fn to_stream(&self, options: &FetchOptions) -> Result<RecordBatchStream> {
        self.to_stream_limit(None, options).await
    }

    /// Stream at most `limit` rows. Memory sources ignore the limit; row
    /// limiting is a sampling aid for database reads.
    pub async fn to_stream_limit(
        &self,
        limit: Option<u64>,
        options: &FetchOptions,
    ) -> Result<RecordBatchStream> {
        match self {
            Source::Database(db) => {
                let driver = drivers::connect_reader(db.endpoint());
                self.to_stream_with_driver(driver.as_ref(), limit, options)
                    .await
            }
            Source::Memory(table) => table.to_stream(options.batch_size),
        }
    }

    /// Stream through an explicit driver instead of the dispatch table.
    pub async fn to_stream_with_driver(
        &self,
        driver: &dyn Driver,
        limit: Option<u64>,
        options: &FetchOptions,
    ) -> Result<RecordBatchStream> {
        match self {
            Source::Database(db) => {
                let sql = db.select_sql(limit);
                info!(source = %self.summary(), "reading source");
                driver.execute_query(&sql, options).await
            }
            Source::Memory(table) => table.to_stream(options.batch_size),
        }
    }

    /// Materialize the source, reading at most `limit` rows when given.
    pub async fn collect(&self, limit: Option<u64>) -> Result<MemoryTable> {
        let stream = self.to_stream_limit(limit, &FetchOptions::default()).await?;
        stream.collect().await
    }

    /// One-line description for plan summaries and logs.
    pub fn summary(&self) -> String {
        match self {
            Source::Database(db) => {
                format!("{}: {}", db.endpoint().display_name(), db.table().quoted())
            }
            Source::Memory(_) => "in-memory table".to_string(),
        }
    }
}
