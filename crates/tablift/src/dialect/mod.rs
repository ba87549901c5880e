//! Backend-specific SQL fragments shared by the drivers.
//!
//! Everything here is plain string assembly. Statements are built from
//! already-normalized identifiers ([`QualifiedName`]), so the only escaping
//! done locally is for schema names embedded in SQL Server's dynamic
//! `EXEC` string.

use crate::core::{BackendKind, QualifiedName};

/// Rewrite a select statement to return at most `limit` rows.
///
/// SQL Server takes `TOP n` immediately after the leading `SELECT`; every
/// other backend understood here accepts a trailing `LIMIT n`. Statements
/// that do not start with `select` are returned with the suffix form, which
/// matches how ad-hoc queries are written against those backends.
pub fn apply_row_limit(sql: &str, limit: u64, kind: &BackendKind) -> String {
    match kind {
        BackendKind::SqlServer => {
            let trimmed = sql.trim_start();
            let starts_with_select = trimmed
                .get(..7)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select "));
            if starts_with_select {
                let prefix_len = sql.len() - trimmed.len() + 7;
                format!("{}top {} {}", &sql[..prefix_len], limit, &sql[prefix_len..])
            } else {
                format!("{sql} limit {limit}")
            }
        }
        _ => format!("{sql} limit {limit}"),
    }
}

/// `DROP TABLE IF EXISTS` for the given table. Valid on every backend the
/// dispatcher routes to.
pub fn drop_table_sql(table: &QualifiedName) -> String {
    format!("DROP TABLE IF EXISTS {}", table.quoted())
}

/// Statement that creates `schema` if it does not exist yet.
///
/// SQL Server has no `CREATE SCHEMA IF NOT EXISTS`, so the check is an
/// `IF (SCHEMA_ID(...) IS NULL)` guard around a dynamic `EXEC`, since
/// `CREATE SCHEMA` must be the only statement in its batch.
pub fn ensure_schema_sql(schema: &str, kind: &BackendKind) -> String {
    match kind {
        BackendKind::SqlServer => {
            // Doubled quotes escape the name inside the string literal and
            // the EXEC'd statement respectively.
            let literal = schema.replace('\'', "''");
            let ident = schema.replace('"', "\"\"");
            format!(
                "IF (SCHEMA_ID('{literal}') IS NULL) BEGIN EXEC ('CREATE SCHEMA \"{ident}\";') END"
            )
        }
        _ => {
            let ident = schema.replace('"', "\"\"");
            format!("CREATE SCHEMA IF NOT EXISTS \"{ident}\"")
        }
    }
}
