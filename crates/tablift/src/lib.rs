//! Streaming tabular data transfer between heterogeneous relational
//! stores.
//!
//! A transfer reads a table (or an in-memory table) from one backend and
//! writes it to another, batch by batch, without materializing the whole
//! table. Supported backends are PostgreSQL, SQL Server, and Snowflake;
//! anything else is routed through permissive fallback paths.
//!
//! ```no_run
//! use tablift::{Endpoint, Pipeline, Source, Target};
//!
//! # async fn demo() -> tablift::Result<()> {
//! let source = Source::table(
//!     Endpoint::from("Driver={ODBC Driver 18 for SQL Server};Server=host;Database=db;"),
//!     "dbo.orders",
//! )?;
//! let target = Target::new(Endpoint::from("postgresql://user:pw@host/db"), "public.orders")?;
//!
//! let report = Pipeline::new(source, target).run().await?;
//! println!("moved {} rows", report.rows);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod target;
pub mod typemap;

pub use crate::core::{
    BackendKind, ConnectionInfo, DataType, Endpoint, Field, MemoryTable, QualifiedName,
    RecordBatch, RecordBatchStream, Schema, TimeUnit, Value,
};
pub use crate::drivers::{Driver, FetchOptions};
pub use crate::error::{Result, TransferError};
pub use crate::pipeline::{Pipeline, TransferReport};
pub use crate::source::Source;
pub use crate::target::{write_strategy, Target, WriteStrategy};
