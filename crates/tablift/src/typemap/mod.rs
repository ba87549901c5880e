//! Logical-type to backend DDL translation.
//!
//! Each backend gets its own mapping from the neutral [`DataType`] taxonomy
//! to a concrete column type string. Translation is total: a type the map
//! does not know falls back to the backend's wide text type, so DDL
//! generation never fails on an exotic source column.

use crate::core::{quote_ident, BackendKind, DataType, QualifiedName, Schema};

/// Translate one logical type to the DDL type for `kind`.
pub fn ddl_type(data_type: &DataType, kind: &BackendKind) -> &'static str {
    match kind {
        // Unknown backends are written over the postgres protocol, so their
        // DDL takes the postgres rendering too.
        BackendKind::Postgres | BackendKind::Other(_) => postgres_type(data_type),
        BackendKind::Snowflake => snowflake_type(data_type),
        BackendKind::SqlServer => sqlserver_type(data_type),
    }
}

fn sqlserver_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "BIT",
        DataType::Int8 | DataType::UInt8 => "TINYINT",
        DataType::Int16 => "SMALLINT",
        DataType::Int32 | DataType::UInt16 => "INT",
        DataType::Int64 | DataType::UInt32 => "BIGINT",
        // No unsigned 64-bit integer type; NUMERIC(20) covers the range.
        DataType::UInt64 => "NUMERIC(20)",
        DataType::Float16 | DataType::Float32 => "FLOAT(24)",
        DataType::Float64 => "FLOAT(53)",
        DataType::Binary => "VARBINARY(MAX)",
        DataType::Date32 => "DATE",
        DataType::Date64 => "DATETIME2",
        DataType::Timestamp(_) => "DATETIME",
        DataType::Utf8 | DataType::Unknown(_) => "VARCHAR(MAX)",
    }
}

fn postgres_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "boolean",
        DataType::Int8 | DataType::Int16 | DataType::UInt8 => "smallint",
        DataType::Int32 | DataType::UInt16 => "integer",
        DataType::Int64 | DataType::UInt32 => "bigint",
        DataType::UInt64 => "numeric(20)",
        DataType::Float16 | DataType::Float32 => "real",
        DataType::Float64 => "double precision",
        DataType::Binary => "bytea",
        DataType::Date32 | DataType::Date64 => "date",
        DataType::Timestamp(_) => "timestamp",
        DataType::Utf8 | DataType::Unknown(_) => "text",
    }
}

fn snowflake_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Boolean => "BOOLEAN",
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "NUMBER(38,0)",
        DataType::Float16 | DataType::Float32 | DataType::Float64 => "FLOAT",
        DataType::Binary => "BINARY",
        DataType::Date32 | DataType::Date64 => "DATE",
        DataType::Timestamp(_) => "TIMESTAMP_NTZ",
        DataType::Utf8 | DataType::Unknown(_) => "VARCHAR",
    }
}

/// Build a `CREATE TABLE` statement for `schema` on `kind`.
///
/// Column names are double-quoted; nullability is rendered explicitly so
/// the target table matches the source regardless of backend defaults.
pub fn create_table_sql(table: &QualifiedName, schema: &Schema, kind: &BackendKind) -> String {
    let columns = schema
        .fields
        .iter()
        .map(|field| {
            format!(
                "{} {} {}",
                quote_ident(&field.name),
                ddl_type(&field.data_type, kind),
                if field.nullable { "NULL" } else { "NOT NULL" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", table.quoted(), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Field, TimeUnit};

    fn all_types() -> Vec<DataType> {
        vec![
            DataType::Boolean,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::UInt64,
            DataType::Float16,
            DataType::Float32,
            DataType::Float64,
            DataType::Utf8,
            DataType::Binary,
            DataType::Date32,
            DataType::Date64,
            DataType::Timestamp(TimeUnit::Microsecond),
            DataType::Unknown("geography".to_string()),
        ]
    }

    #[test]
    fn test_translation_is_total_for_every_backend() {
        let kinds = [
            BackendKind::Postgres,
            BackendKind::SqlServer,
            BackendKind::Snowflake,
            BackendKind::Other("duckdb".to_string()),
        ];
        for kind in &kinds {
            for dt in all_types() {
                assert!(!ddl_type(&dt, kind).is_empty(), "{dt} on {kind}");
            }
        }
    }

    #[test]
    fn test_sqlserver_specifics() {
        let kind = BackendKind::SqlServer;
        assert_eq!(ddl_type(&DataType::UInt8, &kind), "TINYINT");
        assert_eq!(ddl_type(&DataType::UInt64, &kind), "NUMERIC(20)");
        assert_eq!(ddl_type(&DataType::Float16, &kind), "FLOAT(24)");
        assert_eq!(ddl_type(&DataType::Utf8, &kind), "VARCHAR(MAX)");
        assert_eq!(ddl_type(&DataType::Date32, &kind), "DATE");
        assert_eq!(ddl_type(&DataType::Date64, &kind), "DATETIME2");
        assert_eq!(
            ddl_type(&DataType::Timestamp(TimeUnit::Nanosecond), &kind),
            "DATETIME"
        );
        assert_eq!(
            ddl_type(&DataType::Unknown("hierarchyid".to_string()), &kind),
            "VARCHAR(MAX)"
        );
    }

    #[test]
    fn test_unknown_falls_back_to_text_types() {
        let unknown = DataType::Unknown("xml".to_string());
        assert_eq!(ddl_type(&unknown, &BackendKind::Postgres), "text");
        assert_eq!(ddl_type(&unknown, &BackendKind::Snowflake), "VARCHAR");
    }

    #[test]
    fn test_create_table_renders_nullability() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("note", DataType::Utf8, true),
        ]);
        let sql = create_table_sql(
            &QualifiedName::parse("staging.items"),
            &schema,
            &BackendKind::Postgres,
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"staging\".\"items\" (\"id\" bigint NOT NULL, \"note\" text NULL)"
        );
    }

    #[test]
    fn test_other_backend_matches_its_postgres_routing() {
        // Unknown backends connect over the postgres protocol; their DDL
        // must be types that protocol-compatible stores accept.
        let kind = BackendKind::Other("duckdb".to_string());
        assert_eq!(ddl_type(&DataType::Utf8, &kind), "text");
        assert_eq!(ddl_type(&DataType::Int64, &kind), "bigint");
        assert_eq!(ddl_type(&DataType::Boolean, &kind), "boolean");
    }
}
