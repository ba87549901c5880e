//! PostgreSQL wire-protocol driver.
//!
//! Connections are opened per operation and closed when the operation
//! finishes; transfers run one table at a time, so there is nothing to
//! pool. Reads stream through a bounded channel: a spawned task owns the
//! client and pushes batches while the consumer drains them, so only a
//! couple of batches are in memory at once.

use bytes::BytesMut;
use futures::{pin_mut, SinkExt, TryStreamExt};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row, Statement};
use tracing::{debug, instrument};

use async_trait::async_trait;

use crate::core::{
    quote_ident, DataType, Field, QualifiedName, RecordBatch, RecordBatchStream, Schema, TimeUnit,
    Value,
};
use crate::drivers::{Driver, FetchOptions};
use crate::error::{Result, TransferError};

/// PostgreSQL's protocol caps bind parameters per statement at u16::MAX;
/// stay under it with headroom.
const MAX_PARAMS_PER_STATEMENT: usize = 60_000;

/// Driver for PostgreSQL and protocol-compatible stores.
pub struct PgDriver {
    connection_string: String,
}

impl PgDriver {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    async fn connect(&self) -> Result<Client> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls)
            .await
            .map_err(|e| TransferError::connection("postgresql", e.to_string()))?;
        // The connection task ends once the client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl Driver for PgDriver {
    #[instrument(skip(self, options), fields(backend = "postgresql"))]
    async fn execute_query(&self, sql: &str, options: &FetchOptions) -> Result<RecordBatchStream> {
        let client = self.connect().await?;
        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| TransferError::statement(sql, e.to_string()))?;

        // Column metadata is known from the prepared statement, so the
        // stream can expose its schema before the first row arrives.
        let schema = schema_from_statement(&statement).into_shared();
        let (tx, stream) = RecordBatchStream::channel(schema.clone());

        let batch_size = options.batch_size.max(1);
        let sql_owned = sql.to_string();
        tokio::spawn(async move {
            let result = stream_rows(&client, &statement, &sql_owned, schema, batch_size, &tx).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(stream)
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        let client = self.connect().await?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| TransferError::statement(sql, e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, schema, rows), fields(backend = "postgresql", rows = rows.len()))]
    async fn insert_batch(
        &self,
        table: &QualifiedName,
        schema: &Schema,
        rows: Vec<Vec<Value>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let client = self.connect().await?;
        let ncols = schema.len();
        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / ncols.max(1)).max(1);

        let mut written = 0u64;
        for chunk in rows.chunks(rows_per_statement) {
            let sql = multi_row_insert_sql(table, schema, chunk.len());
            let params: Vec<PgParam<'_>> = chunk
                .iter()
                .flat_map(|row| row.iter().map(PgParam))
                .collect();
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            written += client
                .execute(sql.as_str(), &param_refs)
                .await
                .map_err(|e| TransferError::statement(&sql, e.to_string()))?;
        }
        Ok(written)
    }

    #[instrument(skip(self, create_ddl, stream), fields(backend = "postgresql", table = %table))]
    async fn bulk_ingest(
        &self,
        table: &QualifiedName,
        create_ddl: &str,
        mut stream: RecordBatchStream,
    ) -> Result<u64> {
        let client = self.connect().await?;
        client
            .batch_execute(create_ddl)
            .await
            .map_err(|e| TransferError::statement(create_ddl, e.to_string()))?;

        let col_list = stream
            .schema()
            .fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Vec<_>>()
            .join(", ");
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            table.quoted(),
            col_list
        );

        let sink = client
            .copy_in(copy_sql.as_str())
            .await
            .map_err(|e| TransferError::statement(&copy_sql, e.to_string()))?;
        pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(1024 * 1024);
        let mut total = 0u64;
        while let Some(batch) = stream.next_batch().await {
            let batch = batch?;
            write_copy_batch(&mut buf, &batch);
            total += batch.num_rows() as u64;
            sink.send(buf.split().freeze())
                .await
                .map_err(|e| TransferError::statement(&copy_sql, e.to_string()))?;
        }

        let copied = sink
            .finish()
            .await
            .map_err(|e| TransferError::statement(&copy_sql, e.to_string()))?;
        debug!(rows = copied, "COPY finished");
        Ok(total)
    }
}

async fn stream_rows(
    client: &Client,
    statement: &Statement,
    sql: &str,
    schema: std::sync::Arc<Schema>,
    batch_size: usize,
    tx: &tokio::sync::mpsc::Sender<Result<RecordBatch>>,
) -> Result<()> {
    let params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    let row_stream = client
        .query_raw(statement, params)
        .await
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;
    pin_mut!(row_stream);

    let mut pending: Vec<Vec<Value>> = Vec::with_capacity(batch_size);
    while let Some(row) = row_stream
        .try_next()
        .await
        .map_err(|e| TransferError::statement(sql, e.to_string()))?
    {
        pending.push(convert_row(&row, &schema));
        if pending.len() >= batch_size {
            let batch = RecordBatch::from_rows(schema.clone(), std::mem::take(&mut pending))?;
            if tx.send(Ok(batch)).await.is_err() {
                // Consumer dropped the stream; stop reading.
                return Ok(());
            }
            pending.reserve(batch_size);
        }
    }
    if !pending.is_empty() {
        let batch = RecordBatch::from_rows(schema.clone(), pending)?;
        let _ = tx.send(Ok(batch)).await;
    }
    Ok(())
}

fn schema_from_statement(statement: &Statement) -> Schema {
    let fields = statement
        .columns()
        .iter()
        .map(|col| {
            // Result-set metadata carries no nullability; assume nullable.
            Field::new(col.name(), data_type_from_pg(col.type_()), true)
        })
        .collect();
    Schema::new(fields)
}

fn data_type_from_pg(ty: &Type) -> DataType {
    match ty.name() {
        "bool" => DataType::Boolean,
        "int2" => DataType::Int16,
        "int4" => DataType::Int32,
        "int8" => DataType::Int64,
        "float4" => DataType::Float32,
        "float8" => DataType::Float64,
        "text" | "varchar" | "bpchar" | "name" => DataType::Utf8,
        "bytea" => DataType::Binary,
        "date" => DataType::Date32,
        "timestamp" => DataType::Timestamp(TimeUnit::Microsecond),
        other => DataType::Unknown(other.to_string()),
    }
}

/// Pull one row into values following the stream schema. A cell the client
/// cannot decode for its declared type becomes Null rather than failing
/// the whole transfer.
fn convert_row(row: &Row, schema: &Schema) -> Vec<Value> {
    schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| match &field.data_type {
            DataType::Boolean => opt(row.try_get::<_, Option<bool>>(idx), Value::Bool),
            DataType::Int16 => opt(row.try_get::<_, Option<i16>>(idx), Value::I16),
            DataType::Int32 => opt(row.try_get::<_, Option<i32>>(idx), Value::I32),
            DataType::Int64 => opt(row.try_get::<_, Option<i64>>(idx), Value::I64),
            DataType::Float32 => opt(row.try_get::<_, Option<f32>>(idx), Value::F32),
            DataType::Float64 => opt(row.try_get::<_, Option<f64>>(idx), Value::F64),
            DataType::Binary => opt(row.try_get::<_, Option<Vec<u8>>>(idx), Value::Bytes),
            DataType::Date32 | DataType::Date64 => {
                opt(row.try_get::<_, Option<chrono::NaiveDate>>(idx), Value::Date)
            }
            DataType::Timestamp(_) => opt(
                row.try_get::<_, Option<chrono::NaiveDateTime>>(idx),
                Value::DateTime,
            ),
            _ => opt(row.try_get::<_, Option<String>>(idx), Value::Text),
        })
        .collect()
}

fn opt<T>(
    fetched: std::result::Result<Option<T>, tokio_postgres::Error>,
    wrap: impl Fn(T) -> Value,
) -> Value {
    fetched.ok().flatten().map(wrap).unwrap_or(Value::Null)
}

fn multi_row_insert_sql(table: &QualifiedName, schema: &Schema, nrows: usize) -> String {
    let col_list = schema
        .fields
        .iter()
        .map(|f| quote_ident(&f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let ncols = schema.len();
    let mut values = Vec::with_capacity(nrows);
    for r in 0..nrows {
        let placeholders = (0..ncols)
            .map(|c| format!("${}", r * ncols + c + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(format!("({placeholders})"));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table.quoted(),
        col_list,
        values.join(", ")
    )
}

/// Bind adapter so a [`Value`] can travel as a statement parameter.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::I8(v) => i16::from(*v).to_sql(ty, out),
            Value::I16(v) => v.to_sql(ty, out),
            Value::I32(v) => v.to_sql(ty, out),
            Value::I64(v) => v.to_sql(ty, out),
            Value::U8(v) => i16::from(*v).to_sql(ty, out),
            Value::U16(v) => i32::from(*v).to_sql(ty, out),
            Value::U32(v) => i64::from(*v).to_sql(ty, out),
            Value::U64(v) => i64::try_from(*v)
                .map_err(|_| "u64 value out of range for bigint parameter")?
                .to_sql(ty, out),
            Value::F32(v) => v.to_sql(ty, out),
            Value::F64(v) => v.to_sql(ty, out),
            Value::Text(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::DateTime(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn write_copy_batch(buf: &mut BytesMut, batch: &RecordBatch) {
    use bytes::BufMut;

    for row in 0..batch.num_rows() {
        for col in 0..batch.num_columns() {
            if col > 0 {
                buf.put_u8(b'\t');
            }
            buf.put_slice(value_to_copy_text(batch.at(col, row)).as_bytes());
        }
        buf.put_u8(b'\n');
    }
}

/// Render one value in COPY text format.
fn value_to_copy_text(value: &Value) -> String {
    match value {
        Value::Null => "\\N".to_string(),
        Value::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        Value::I8(n) => n.to_string(),
        Value::I16(n) => n.to_string(),
        Value::I32(n) => n.to_string(),
        Value::I64(n) => n.to_string(),
        Value::U8(n) => n.to_string(),
        Value::U16(n) => n.to_string(),
        Value::U32(n) => n.to_string(),
        Value::U64(n) => n.to_string(),
        Value::F32(n) => n.to_string(),
        Value::F64(n) => n.to_string(),
        Value::Text(s) => escape_copy_text(s),
        Value::Bytes(b) => format!("\\\\x{}", hex::encode(b)),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
    }
}

/// Escape special characters for COPY text format.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}
