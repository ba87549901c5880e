//! Core data model: identifiers, endpoints, schemas, values, streams.

pub mod endpoint;
pub mod identifier;
pub mod schema;
pub mod value;

pub use endpoint::{BackendKind, ConnectionInfo, Endpoint};
pub use identifier::{quote_ident, QualifiedName};
pub use schema::{DataType, Field, Schema, TimeUnit};
pub use value::{MemoryTable, RecordBatch, RecordBatchStream, Value};
