//! ODBC driver, used for SQL Server and Snowflake.
//!
//! ODBC connections are not `Send`, so every operation runs inside
//! `spawn_blocking` with a connection opened and dropped on the blocking
//! thread. Streaming reads hand batches back to the async side through a
//! bounded channel with `blocking_send`, which gives the same backpressure
//! as the async driver.
//!
//! Result sets are fetched through [`TextRowSet`], so every cell arrives as
//! text and is re-typed from the column metadata. Cell size is capped by
//! the fetch options; anything longer is truncated by the ODBC layer.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use odbc_api::{
    buffers::TextRowSet, Connection, ConnectionOptions, Cursor, DataType as OdbcDataType,
    Environment, ResultSetMetadata,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

use crate::core::value::STREAM_CHANNEL_DEPTH;
use crate::core::{
    quote_ident, DataType, Field, QualifiedName, RecordBatch, RecordBatchStream, Schema, TimeUnit,
    Value,
};
use crate::drivers::{Driver, FetchOptions};
use crate::error::{Result, TransferError};

static ENV: OnceLock<Environment> = OnceLock::new();

/// The process-wide ODBC environment. Created on first use; the handle is
/// shared by every connection for the lifetime of the process.
fn environment() -> Result<&'static Environment> {
    if let Some(env) = ENV.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| {
        TransferError::connection(
            "odbc",
            format!("failed to create ODBC environment: {e}. Is an ODBC driver manager installed?"),
        )
    })?;
    Ok(ENV.get_or_init(|| env))
}

/// Driver for any store reachable through an ODBC driver on the host.
pub struct OdbcDriver {
    connection_string: String,
}

impl OdbcDriver {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    fn connect(connection_string: &str) -> Result<Connection<'static>> {
        environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())
            .map_err(|e| TransferError::connection("odbc", e.to_string()))
    }
}

#[async_trait]
impl Driver for OdbcDriver {
    #[instrument(skip(self, options), fields(backend = "odbc"))]
    async fn execute_query(&self, sql: &str, options: &FetchOptions) -> Result<RecordBatchStream> {
        let (schema_tx, schema_rx) = oneshot::channel();
        let (batch_tx, mut batch_rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);

        let connection_string = self.connection_string.clone();
        let sql = sql.to_string();
        let options = options.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = read_blocking(&connection_string, &sql, &options, schema_tx, &batch_tx);
            if let Err(e) = outcome {
                let _ = batch_tx.blocking_send(Err(e));
            }
        });

        match schema_rx.await {
            Ok(schema) => Ok(RecordBatchStream::from_parts(schema, batch_rx)),
            // The reader failed before metadata was available; the real
            // error is waiting in the batch channel.
            Err(_) => match batch_rx.recv().await {
                Some(Err(e)) => Err(e),
                _ => Err(TransferError::connection("odbc", "query setup failed")),
            },
        }
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        let connection_string = self.connection_string.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = OdbcDriver::connect(&connection_string)?;
            conn.execute(&sql, ())
                .map_err(|e| TransferError::statement(&sql, e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| TransferError::connection("odbc", e.to_string()))?
    }

    #[instrument(skip(self, schema, rows), fields(backend = "odbc", rows = rows.len()))]
    async fn insert_batch(
        &self,
        table: &QualifiedName,
        schema: &Schema,
        rows: Vec<Vec<Value>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let connection_string = self.connection_string.clone();
        let sql = insert_sql(table, schema);
        tokio::task::spawn_blocking(move || insert_blocking(&connection_string, &sql, rows))
            .await
            .map_err(|e| TransferError::connection("odbc", e.to_string()))?
    }

    #[instrument(skip(self, create_ddl, stream), fields(backend = "odbc", table = %table))]
    async fn bulk_ingest(
        &self,
        table: &QualifiedName,
        create_ddl: &str,
        mut stream: RecordBatchStream,
    ) -> Result<u64> {
        self.execute_statement(create_ddl).await?;

        // ODBC has no dedicated bulk-load channel; the fastest generic path
        // is array-bound inserts, one round trip per batch.
        let schema = stream.schema().clone();
        let mut total = 0u64;
        while let Some(batch) = stream.next_batch().await {
            let batch = batch?;
            total += self.insert_batch(table, &schema, batch.to_rows()).await?;
        }
        debug!(rows = total, "bulk ingest finished");
        Ok(total)
    }
}

fn read_blocking(
    connection_string: &str,
    sql: &str,
    options: &FetchOptions,
    schema_tx: oneshot::Sender<Arc<Schema>>,
    batch_tx: &mpsc::Sender<Result<RecordBatch>>,
) -> Result<()> {
    let conn = OdbcDriver::connect(connection_string)?;
    let cursor = conn
        .execute(sql, ())
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;
    let Some(mut cursor) = cursor else {
        // Statement produced no result set; expose an empty schema and end
        // the stream.
        let _ = schema_tx.send(Schema::empty().into_shared());
        return Ok(());
    };

    let schema = schema_from_cursor(&mut cursor)?.into_shared();
    if schema_tx.send(schema.clone()).is_err() {
        return Ok(());
    }

    let max_cell = options.max_text_size.max(options.max_binary_size);
    let mut buffers = TextRowSet::for_cursor(options.batch_size.max(1), &mut cursor, Some(max_cell))
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;
    let mut row_cursor = cursor
        .bind_buffer(&mut buffers)
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;

    while let Some(fetched) = row_cursor
        .fetch()
        .map_err(|e| TransferError::statement(sql, e.to_string()))?
    {
        let mut rows = Vec::with_capacity(fetched.num_rows());
        for row_idx in 0..fetched.num_rows() {
            let row = schema
                .fields
                .iter()
                .enumerate()
                .map(|(col_idx, field)| {
                    let text = fetched
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).to_string());
                    text_to_value(text, &field.data_type)
                })
                .collect();
            rows.push(row);
        }
        let batch = RecordBatch::from_rows(schema.clone(), rows)?;
        if batch_tx.blocking_send(Ok(batch)).is_err() {
            // Consumer dropped the stream; stop reading.
            return Ok(());
        }
    }
    Ok(())
}

fn schema_from_cursor(cursor: &mut impl ResultSetMetadata) -> Result<Schema> {
    let num_cols = cursor
        .num_result_cols()
        .map_err(|e| TransferError::Schema(format!("failed to get column count: {e}")))?;
    let mut fields = Vec::with_capacity(num_cols as usize);
    for col in 1..=num_cols as u16 {
        let name = cursor
            .col_name(col)
            .map_err(|e| TransferError::Schema(format!("failed to get column name: {e}")))?;
        let odbc_type = cursor
            .col_data_type(col)
            .map_err(|e| TransferError::Schema(format!("failed to get column type: {e}")))?;
        // ODBC nullability reporting is unreliable across drivers; assume
        // nullable.
        fields.push(Field::new(name, data_type_from_odbc(&odbc_type), true));
    }
    Ok(Schema::new(fields))
}

fn data_type_from_odbc(odbc_type: &OdbcDataType) -> DataType {
    match odbc_type {
        OdbcDataType::Bit => DataType::Boolean,
        OdbcDataType::TinyInt => DataType::Int8,
        OdbcDataType::SmallInt => DataType::Int16,
        OdbcDataType::Integer => DataType::Int32,
        OdbcDataType::BigInt => DataType::Int64,
        OdbcDataType::Real => DataType::Float32,
        OdbcDataType::Float { .. } | OdbcDataType::Double => DataType::Float64,
        OdbcDataType::Date => DataType::Date32,
        OdbcDataType::Timestamp { .. } => DataType::Timestamp(TimeUnit::Microsecond),
        OdbcDataType::Char { .. }
        | OdbcDataType::WChar { .. }
        | OdbcDataType::Varchar { .. }
        | OdbcDataType::WVarchar { .. }
        | OdbcDataType::LongVarchar { .. }
        | OdbcDataType::Other {
            data_type: odbc_api::sys::SqlDataType::EXT_W_LONG_VARCHAR,
            ..
        } => DataType::Utf8,
        OdbcDataType::Binary { .. }
        | OdbcDataType::Varbinary { .. }
        | OdbcDataType::LongVarbinary { .. } => DataType::Binary,
        OdbcDataType::Numeric { .. } | OdbcDataType::Decimal { .. } => {
            DataType::Unknown("decimal".to_string())
        }
        OdbcDataType::Time { .. } => DataType::Unknown("time".to_string()),
        _ => DataType::Unknown("unknown".to_string()),
    }
}

/// Re-type a text cell according to the column's logical type. A cell that
/// fails to parse for its declared type becomes Null rather than failing
/// the whole transfer.
fn text_to_value(text: Option<String>, data_type: &DataType) -> Value {
    let Some(s) = text else {
        return Value::Null;
    };
    match data_type {
        DataType::Boolean => match s.as_str() {
            "1" | "true" | "True" | "TRUE" => Value::Bool(true),
            "0" | "false" | "False" | "FALSE" => Value::Bool(false),
            _ => Value::Null,
        },
        DataType::Int8 => s.parse().map(Value::I8).unwrap_or(Value::Null),
        DataType::Int16 => s.parse().map(Value::I16).unwrap_or(Value::Null),
        DataType::Int32 => s.parse().map(Value::I32).unwrap_or(Value::Null),
        DataType::Int64 => s.parse().map(Value::I64).unwrap_or(Value::Null),
        DataType::UInt8 => s.parse().map(Value::U8).unwrap_or(Value::Null),
        DataType::UInt16 => s.parse().map(Value::U16).unwrap_or(Value::Null),
        DataType::UInt32 => s.parse().map(Value::U32).unwrap_or(Value::Null),
        DataType::UInt64 => s.parse().map(Value::U64).unwrap_or(Value::Null),
        DataType::Float16 | DataType::Float32 => s.parse().map(Value::F32).unwrap_or(Value::Null),
        DataType::Float64 => s.parse().map(Value::F64).unwrap_or(Value::Null),
        DataType::Binary => {
            // Binary arrives as a hex string, with or without 0x prefix.
            let hex_str = s
                .strip_prefix("0x")
                .or_else(|| s.strip_prefix("0X"))
                .unwrap_or(&s);
            hex::decode(hex_str)
                .map(Value::Bytes)
                .unwrap_or_else(|_| Value::Bytes(s.into_bytes()))
        }
        DataType::Date32 | DataType::Date64 => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Value::Date)
            .unwrap_or(Value::Null),
        DataType::Timestamp(_) => {
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f"))
                .map(Value::DateTime)
                .unwrap_or(Value::Null)
        }
        DataType::Utf8 | DataType::Unknown(_) => Value::Text(s),
    }
}

fn insert_sql(table: &QualifiedName, schema: &Schema) -> String {
    let col_list = schema
        .fields
        .iter()
        .map(|f| quote_ident(&f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; schema.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.quoted(),
        col_list,
        placeholders
    )
}

fn insert_blocking(connection_string: &str, sql: &str, rows: Vec<Vec<Value>>) -> Result<u64> {
    let conn = OdbcDriver::connect(connection_string)?;
    let prepared = conn
        .prepare(sql)
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;

    // Every cell travels as text; the buffer needs the widest cell seen in
    // each column.
    let text_rows: Vec<Vec<Option<Vec<u8>>>> = rows
        .iter()
        .map(|row| row.iter().map(value_to_param_text).collect())
        .collect();
    let ncols = text_rows.first().map(Vec::len).unwrap_or(0);
    let max_lens: Vec<usize> = (0..ncols)
        .map(|col| {
            text_rows
                .iter()
                .filter_map(|row| row[col].as_ref().map(Vec::len))
                .max()
                .unwrap_or(1)
                .max(1)
        })
        .collect();

    let mut inserter = prepared
        .into_text_inserter(text_rows.len(), max_lens)
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;
    for row in &text_rows {
        inserter
            .append(row.iter().map(|cell| cell.as_deref()))
            .map_err(|e| TransferError::statement(sql, e.to_string()))?;
    }
    inserter
        .execute()
        .map_err(|e| TransferError::statement(sql, e.to_string()))?;
    Ok(text_rows.len() as u64)
}

/// Render a value as the text form bound to an insert parameter.
fn value_to_param_text(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { b"1".to_vec() } else { b"0".to_vec() }),
        Value::I8(n) => Some(n.to_string().into_bytes()),
        Value::I16(n) => Some(n.to_string().into_bytes()),
        Value::I32(n) => Some(n.to_string().into_bytes()),
        Value::I64(n) => Some(n.to_string().into_bytes()),
        Value::U8(n) => Some(n.to_string().into_bytes()),
        Value::U16(n) => Some(n.to_string().into_bytes()),
        Value::U32(n) => Some(n.to_string().into_bytes()),
        Value::U64(n) => Some(n.to_string().into_bytes()),
        Value::F32(n) => Some(n.to_string().into_bytes()),
        Value::F64(n) => Some(n.to_string().into_bytes()),
        Value::Text(s) => Some(s.clone().into_bytes()),
        Value::Bytes(b) => Some(b.clone()),
        Value::Date(d) => Some(d.format("%Y-%m-%d").to_string().into_bytes()),
        Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_uses_positional_placeholders() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]);
        let sql = insert_sql(&QualifiedName::parse("staging.users"), &schema);
        assert_eq!(
            sql,
            "INSERT INTO \"staging\".\"users\" (\"id\", \"name\") VALUES (?, ?)"
        );
    }

    #[test]
    fn test_text_to_value_typed_parsing() {
        assert_eq!(
            text_to_value(Some("42".to_string()), &DataType::Int32),
            Value::I32(42)
        );
        assert_eq!(
            text_to_value(Some("1".to_string()), &DataType::Boolean),
            Value::Bool(true)
        );
        assert_eq!(text_to_value(None, &DataType::Int64), Value::Null);
        assert_eq!(
            text_to_value(Some("not a number".to_string()), &DataType::Int64),
            Value::Null
        );
        assert_eq!(
            text_to_value(Some("0xCAFE".to_string()), &DataType::Binary),
            Value::Bytes(vec![0xca, 0xfe])
        );
    }

    #[test]
    fn test_text_to_value_datetime_formats() {
        for raw in [
            "2023-12-25 10:30:45.123",
            "2023-12-25 10:30:45",
            "2023-12-25T10:30:45.123",
        ] {
            let v = text_to_value(
                Some(raw.to_string()),
                &DataType::Timestamp(TimeUnit::Microsecond),
            );
            assert!(matches!(v, Value::DateTime(_)), "failed for {raw}");
        }
    }

    #[test]
    fn test_param_text_rendering() {
        assert_eq!(value_to_param_text(&Value::Null), None);
        assert_eq!(value_to_param_text(&Value::Bool(false)), Some(b"0".to_vec()));
        assert_eq!(
            value_to_param_text(&Value::Text("abc".to_string())),
            Some(b"abc".to_vec())
        );
    }

    #[test]
    fn test_odbc_type_mapping() {
        assert_eq!(data_type_from_odbc(&OdbcDataType::BigInt), DataType::Int64);
        assert_eq!(data_type_from_odbc(&OdbcDataType::Bit), DataType::Boolean);
        assert_eq!(
            data_type_from_odbc(&OdbcDataType::Varchar { length: None }),
            DataType::Utf8
        );
    }
}
