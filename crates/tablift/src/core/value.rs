//! In-flight data representation: cell values, columnar batches, streams.
//!
//! Rows travel between backends as a sequence of [`RecordBatch`] chunks
//! pulled from a [`RecordBatchStream`]. The stream is backed by a bounded
//! channel so a slow writer exerts backpressure on the reader instead of
//! buffering the whole table in memory.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::mpsc;

use crate::core::schema::Schema;
use crate::error::{Result, TransferError};

/// Channel depth between a reading driver and the consuming writer. Two
/// batches in flight keeps the reader busy without unbounded buffering.
pub(crate) const STREAM_CHANNEL_DEPTH: usize = 2;

/// One cell. Immutable once constructed; a batch is never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A columnar chunk of rows sharing one schema.
///
/// Columns are stored as `columns[col][row]`; every column has the same
/// length. Constructed via [`RecordBatch::try_new`], which enforces the
/// shape, or [`RecordBatch::from_rows`] for row-oriented input.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    schema: Arc<Schema>,
    columns: Vec<Vec<Value>>,
}

impl RecordBatch {
    /// Build a batch from columns, checking that the column count matches
    /// the schema and all columns are the same length.
    pub fn try_new(schema: Arc<Schema>, columns: Vec<Vec<Value>>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(TransferError::Schema(format!(
                "batch has {} columns but schema has {}",
                columns.len(),
                schema.len()
            )));
        }
        if let Some(first) = columns.first() {
            for (i, col) in columns.iter().enumerate() {
                if col.len() != first.len() {
                    return Err(TransferError::Schema(format!(
                        "column {} has {} rows, expected {}",
                        i,
                        col.len(),
                        first.len()
                    )));
                }
            }
        }
        Ok(Self { schema, columns })
    }

    /// Build a batch from row-oriented data, transposing into columns.
    pub fn from_rows(schema: Arc<Schema>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let ncols = schema.len();
        let mut columns: Vec<Vec<Value>> = (0..ncols).map(|_| Vec::with_capacity(rows.len())).collect();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != ncols {
                return Err(TransferError::Schema(format!(
                    "row {} has {} values but schema has {} columns",
                    i,
                    row.len(),
                    ncols
                )));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Ok(Self { schema, columns })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    /// The cell at `(column, row)`.
    pub fn at(&self, column: usize, row: usize) -> &Value {
        &self.columns[column][row]
    }

    pub fn column(&self, column: usize) -> &[Value] {
        &self.columns[column]
    }

    /// Rows in order, each cloned out of the columnar storage.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.num_rows())
            .map(|row| self.columns.iter().map(|col| col[row].clone()).collect())
            .collect()
    }
}

/// A fully materialized table, used as an in-memory endpoint and as the
/// result of collecting a stream.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: Arc<Schema>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let schema = schema.into_shared();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(TransferError::Schema(format!(
                    "row {} has {} values but schema has {} columns",
                    i,
                    row.len(),
                    schema.len()
                )));
            }
        }
        Ok(Self { schema, rows })
    }

    pub fn empty(schema: Schema) -> Self {
        Self {
            schema: schema.into_shared(),
            rows: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Chunk the rows into batches of `batch_size` and expose them as a
    /// stream. The final batch may be short; an empty table yields no
    /// batches at all.
    pub fn to_stream(&self, batch_size: usize) -> Result<RecordBatchStream> {
        let batch_size = batch_size.max(1);
        let mut batches = Vec::with_capacity(self.rows.len().div_ceil(batch_size));
        for chunk in self.rows.chunks(batch_size) {
            batches.push(RecordBatch::from_rows(self.schema.clone(), chunk.to_vec())?);
        }
        Ok(RecordBatchStream::from_batches(self.schema.clone(), batches))
    }
}

/// An ordered stream of batches with a known schema.
///
/// The schema is available before any batch arrives, so a writer can issue
/// DDL before consuming rows. Batches arrive in source order.
pub struct RecordBatchStream {
    schema: Arc<Schema>,
    receiver: mpsc::Receiver<Result<RecordBatch>>,
}

impl RecordBatchStream {
    /// Create a stream fed by a channel; the producer holds the sender.
    pub fn channel(schema: Arc<Schema>) -> (mpsc::Sender<Result<RecordBatch>>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);
        (
            tx,
            Self {
                schema,
                receiver: rx,
            },
        )
    }

    /// Assemble a stream from a schema and an already-wired receiver.
    pub(crate) fn from_parts(
        schema: Arc<Schema>,
        receiver: mpsc::Receiver<Result<RecordBatch>>,
    ) -> Self {
        Self { schema, receiver }
    }

    /// Create a stream over already-materialized batches.
    pub fn from_batches(schema: Arc<Schema>, batches: Vec<RecordBatch>) -> Self {
        // The channel must hold every batch up front since nothing drains
        // it while we fill it.
        let (tx, rx) = mpsc::channel(batches.len().max(1));
        for batch in batches {
            // Capacity equals batch count, so try_send cannot fail.
            let _ = tx.try_send(Ok(batch));
        }
        Self {
            schema,
            receiver: rx,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Next batch in order, or `None` when the stream is exhausted. A read
    /// error on the producer side surfaces here.
    pub async fn next_batch(&mut self) -> Option<Result<RecordBatch>> {
        self.receiver.recv().await
    }

    /// Drain the stream into a [`MemoryTable`].
    pub async fn collect(mut self) -> Result<MemoryTable> {
        let mut rows = Vec::new();
        while let Some(batch) = self.next_batch().await {
            let batch = batch?;
            rows.extend(batch.to_rows());
        }
        Ok(MemoryTable {
            schema: self.schema,
            rows,
        })
    }
}
