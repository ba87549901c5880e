//! Backend drivers and dispatch.
//!
//! A [`Driver`] is the narrow capability surface the source and target
//! layers consume: run a query as a stream, execute a statement, append a
//! batch, or bulk-load a whole stream. Two implementations exist, one for
//! the PostgreSQL wire protocol and one for ODBC; the dispatch tables below
//! route each [`BackendKind`] to the right one per direction.
//!
//! Snowflake has no native wire driver in this stack, so both its read and
//! write paths go through ODBC with the Snowflake ODBC driver installed on
//! the host. Unknown backends are assumed to speak the PostgreSQL protocol
//! on the read side and get the conservative statement-based write path.

pub mod odbc;
pub mod postgres;

use async_trait::async_trait;

use crate::core::{BackendKind, Endpoint, QualifiedName, RecordBatchStream, Schema, Value};
use crate::error::Result;

pub use odbc::OdbcDriver;
pub use postgres::PgDriver;

/// Rows per batch pulled from a source result set.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Upper bound on a single text cell fetched over ODBC, in bytes.
pub const MAX_TEXT_SIZE: usize = 10_000_000;

/// Upper bound on a single binary cell fetched over ODBC, in bytes.
pub const MAX_BINARY_SIZE: usize = 10_000_000;

/// Tuning knobs for streaming reads.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub batch_size: usize,
    pub max_text_size: usize,
    pub max_binary_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_text_size: MAX_TEXT_SIZE,
            max_binary_size: MAX_BINARY_SIZE,
        }
    }
}

/// Capability surface a backend driver exposes to the transfer layers.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a query and stream its result set in batches. The stream's
    /// schema is resolved before the first batch is produced.
    async fn execute_query(&self, sql: &str, options: &FetchOptions) -> Result<RecordBatchStream>;

    /// Execute a statement that returns no rows (DDL, DROP, schema guard).
    async fn execute_statement(&self, sql: &str) -> Result<()>;

    /// Append one batch of rows to an existing table using a parameterized
    /// multi-row insert.
    async fn insert_batch(
        &self,
        table: &QualifiedName,
        schema: &Schema,
        rows: Vec<Vec<Value>>,
    ) -> Result<u64>;

    /// Create `table` from `create_ddl` and load the whole stream into it
    /// using the backend's fastest load path. Returns rows written.
    async fn bulk_ingest(
        &self,
        table: &QualifiedName,
        create_ddl: &str,
        stream: RecordBatchStream,
    ) -> Result<u64>;
}

/// Driver used to read from `endpoint`.
///
/// Unknown kinds get the PostgreSQL driver on the assumption that most
/// URI-addressed stores either speak the protocol or fail with a clear
/// connection error.
pub fn connect_reader(endpoint: &Endpoint) -> Box<dyn Driver> {
    match endpoint.kind() {
        BackendKind::Postgres | BackendKind::Other(_) => {
            Box::new(PgDriver::new(endpoint.connection_string()))
        }
        BackendKind::SqlServer | BackendKind::Snowflake => {
            Box::new(OdbcDriver::new(endpoint.connection_string()))
        }
    }
}

/// Driver used to write to `endpoint`. Same routing as the read side; the
/// write *strategy* (bulk vs. incremental) is decided separately by the
/// target layer.
pub fn connect_writer(endpoint: &Endpoint) -> Box<dyn Driver> {
    match endpoint.kind() {
        BackendKind::Postgres | BackendKind::Other(_) => {
            Box::new(PgDriver::new(endpoint.connection_string()))
        }
        BackendKind::SqlServer | BackendKind::Snowflake => {
            Box::new(OdbcDriver::new(endpoint.connection_string()))
        }
    }
}
