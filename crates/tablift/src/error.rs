//! Error types for transfer operations.

use thiserror::Error;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Invalid transfer description (bad endpoint, empty table name, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to reach a backend.
    #[error("Connection error ({backend}): {message}")]
    Connection { backend: String, message: String },

    /// A SQL or DDL statement failed on a backend.
    #[error("Statement error: {message}\n  Statement: {sql}")]
    Statement { sql: String, message: String },

    /// Mismatched batch shape or a stream that does not match its schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// PostgreSQL driver error.
    #[error("Postgres driver error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// ODBC driver error.
    #[error("ODBC driver error: {0}")]
    Odbc(#[from] odbc_api::Error),
}

impl TransferError {
    /// Create a Connection error with the backend it occurred against.
    pub fn connection(backend: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Connection {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a Statement error carrying the offending SQL text.
    pub fn statement(sql: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Statement {
            sql: sql.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
