//! End-to-end transfer behavior against a scripted driver.

use std::sync::Mutex;
use std::sync::Once;

use async_trait::async_trait;
use tablift::{
    DataType, Driver, Endpoint, FetchOptions, Field, MemoryTable, Pipeline, QualifiedName,
    RecordBatchStream, Result, Schema, Source, Target, Value,
};

static INIT_TRACING: Once = Once::new();

/// Route transfer logs through the test writer; `RUST_LOG` controls
/// verbosity.
fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Driver double that records every call and serves reads from an
/// in-memory table.
#[derive(Default)]
struct MockDriver {
    data: Option<MemoryTable>,
    statements: Mutex<Vec<String>>,
    inserted_batches: Mutex<Vec<usize>>,
    inserted_rows: Mutex<Vec<Vec<Value>>>,
    bulk_calls: Mutex<Vec<(String, String, u64)>>,
}

impl MockDriver {
    fn with_data(table: MemoryTable) -> Self {
        Self {
            data: Some(table),
            ..Default::default()
        }
    }

    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn execute_query(&self, sql: &str, options: &FetchOptions) -> Result<RecordBatchStream> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.data
            .as_ref()
            .expect("mock driver has no data to serve")
            .to_stream(options.batch_size)
    }

    async fn execute_statement(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn insert_batch(
        &self,
        _table: &QualifiedName,
        _schema: &Schema,
        rows: Vec<Vec<Value>>,
    ) -> Result<u64> {
        self.inserted_batches.lock().unwrap().push(rows.len());
        let count = rows.len() as u64;
        self.inserted_rows.lock().unwrap().extend(rows);
        Ok(count)
    }

    async fn bulk_ingest(
        &self,
        table: &QualifiedName,
        create_ddl: &str,
        mut stream: RecordBatchStream,
    ) -> Result<u64> {
        let mut rows = 0u64;
        while let Some(batch) = stream.next_batch().await {
            rows += batch?.num_rows() as u64;
        }
        self.bulk_calls
            .lock()
            .unwrap()
            .push((table.quoted(), create_ddl.to_string(), rows));
        Ok(rows)
    }
}

fn sample_table(nrows: i64) -> MemoryTable {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    let rows = (0..nrows)
        .map(|i| vec![Value::I64(i), Value::Text(format!("row-{i}"))])
        .collect();
    MemoryTable::new(schema, rows).unwrap()
}

#[tokio::test]
async fn incremental_write_prepares_schema_then_drops_then_creates() {
    init_tracing();
    let source = Source::memory(sample_table(5));
    let target = Target::new(Endpoint::from("Driver={X};Server=h;"), "staging.users").unwrap();
    let reader = MockDriver::default();
    let writer = MockDriver::default();

    let report = Pipeline::new(source, target)
        .run_with_drivers(&reader, &writer)
        .await
        .unwrap();
    assert_eq!(report.rows, 5);

    let statements = writer.statements();
    assert_eq!(statements.len(), 3);
    assert_eq!(
        statements[0],
        "IF (SCHEMA_ID('staging') IS NULL) BEGIN EXEC ('CREATE SCHEMA \"staging\";') END"
    );
    assert_eq!(statements[1], "DROP TABLE IF EXISTS \"staging\".\"users\"");
    assert!(statements[2].starts_with("CREATE TABLE \"staging\".\"users\" ("));
    assert!(statements[2].contains("\"id\" BIGINT NOT NULL"));
    assert!(statements[2].contains("\"name\" VARCHAR(MAX) NULL"));
}

#[tokio::test]
async fn incremental_write_appends_batches_in_order() {
    init_tracing();
    let source = Source::memory(sample_table(5));
    let target = Target::new(Endpoint::from("Driver={X};Server=h;"), "staging.users").unwrap();
    let reader = MockDriver::default();
    let writer = MockDriver::default();

    let pipeline = Pipeline::new(source, target).with_options(FetchOptions {
        batch_size: 2,
        ..FetchOptions::default()
    });
    let report = pipeline.run_with_drivers(&reader, &writer).await.unwrap();
    assert_eq!(report.rows, 5);

    // Batch sizes follow the chunking, and rows land in source order.
    assert_eq!(*writer.inserted_batches.lock().unwrap(), vec![2, 2, 1]);
    let rows = writer.inserted_rows.lock().unwrap();
    let ids: Vec<i64> = rows
        .iter()
        .map(|row| match &row[0] {
            Value::I64(id) => *id,
            other => panic!("unexpected value {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn bulk_write_drops_then_hands_ddl_to_driver() {
    init_tracing();
    let source = Source::memory(sample_table(3));
    let target = Target::new(Endpoint::from("postgresql://h/db"), "public.users").unwrap();
    let reader = MockDriver::default();
    let writer = MockDriver::default();

    let report = Pipeline::new(source, target)
        .run_with_drivers(&reader, &writer)
        .await
        .unwrap();
    assert_eq!(report.rows, 3);

    // The only direct statement is the drop; creation happens inside the
    // driver's bulk path so it can wrap both in one session.
    let statements = writer.statements();
    assert_eq!(
        statements,
        vec!["DROP TABLE IF EXISTS \"public\".\"users\"".to_string()]
    );

    let bulk = writer.bulk_calls.lock().unwrap();
    assert_eq!(bulk.len(), 1);
    let (table, ddl, rows) = &bulk[0];
    assert_eq!(table, "\"public\".\"users\"");
    assert_eq!(
        ddl,
        "CREATE TABLE \"public\".\"users\" (\"id\" bigint NOT NULL, \"name\" text NULL)"
    );
    assert_eq!(*rows, 3);
}

#[tokio::test]
async fn snowflake_target_uses_bulk_strategy() {
    init_tracing();
    let source = Source::memory(sample_table(2));
    let target = Target::new(Endpoint::from("snowflake://acct/db"), "analytics.users").unwrap();
    let reader = MockDriver::default();
    let writer = MockDriver::default();

    Pipeline::new(source, target)
        .run_with_drivers(&reader, &writer)
        .await
        .unwrap();

    let bulk = writer.bulk_calls.lock().unwrap();
    assert_eq!(bulk.len(), 1);
    assert!(bulk[0].1.contains("\"id\" NUMBER(38,0) NOT NULL"));
    assert!(writer.inserted_batches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn database_read_issues_limited_select() {
    init_tracing();
    let source = Source::table(Endpoint::from("Driver={X};Server=h;"), "dbo.orders").unwrap();
    let target = Target::new(Endpoint::from("postgresql://h/db"), "public.orders").unwrap();
    let reader = MockDriver::with_data(sample_table(10));
    let writer = MockDriver::default();

    let report = Pipeline::new(source, target)
        .with_limit(4)
        .run_with_drivers(&reader, &writer)
        .await
        .unwrap();

    assert_eq!(
        reader.statements(),
        vec!["select top 4 * from \"dbo\".\"orders\"".to_string()]
    );
    // The mock serves its whole table; the report counts what was written.
    assert_eq!(report.rows, 10);
}

#[tokio::test]
async fn unknown_backend_gets_incremental_path_with_default_schema() {
    init_tracing();
    let source = Source::memory(sample_table(1));
    let target = Target::new(Endpoint::from("duckdb://file.db"), "users").unwrap();
    let reader = MockDriver::default();
    let writer = MockDriver::default();

    Pipeline::new(source, target)
        .run_with_drivers(&reader, &writer)
        .await
        .unwrap();

    let statements = writer.statements();
    // Unqualified table: the default staging schema is still ensured.
    assert_eq!(statements[0], "CREATE SCHEMA IF NOT EXISTS \"staging\"");
    assert_eq!(statements[1], "DROP TABLE IF EXISTS \"users\"");
    // Unknown backends are written over the postgres protocol, so the
    // whole statement sequence must be postgres SQL, DDL types included.
    assert_eq!(
        statements[2],
        "CREATE TABLE \"users\" (\"id\" bigint NOT NULL, \"name\" text NULL)"
    );
}
