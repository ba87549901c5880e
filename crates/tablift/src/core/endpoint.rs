//! Canonical backend endpoint descriptors.
//!
//! An [`Endpoint`] names a backend kind plus the opaque connection string the
//! driver layer hands to the wire client. It is built either from a typed
//! [`ConnectionInfo`] or from a raw connection string whose kind is inferred
//! from its shape.
//!
//! # Kind inference is best-effort
//!
//! A string starting with the ODBC driver marker `Driver=` is taken as SQL
//! Server; otherwise the scheme before the first `://` is taken literally. A
//! malformed string silently yields a possibly-wrong kind; downstream
//! dispatch treats unrecognized kinds as the [`BackendKind::Other`] fallback
//! rather than raising. This permissiveness is deliberate and can mask a
//! genuinely malformed connection string; callers who need strictness
//! should construct a [`ConnectionInfo`] with an explicit kind instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection-string prefix identifying an ODBC-style SQL Server string.
const ODBC_DRIVER_MARKER: &str = "Driver=";

/// Kind of backend an endpoint points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    SqlServer,
    Snowflake,
    /// Any other backend; carries the scheme (or the whole string when no
    /// scheme was present). Dispatched through the documented fallback paths.
    Other(String),
}

impl BackendKind {
    /// Parse a kind from a connection-string scheme.
    fn from_scheme(scheme: &str) -> Self {
        match scheme {
            "postgresql" | "postgres" => BackendKind::Postgres,
            "sqlserver" => BackendKind::SqlServer,
            "snowflake" => BackendKind::Snowflake,
            other => BackendKind::Other(other.to_string()),
        }
    }

    /// Short name used in display names and log fields.
    pub fn name(&self) -> &str {
        match self {
            BackendKind::Postgres => "postgresql",
            BackendKind::SqlServer => "sqlserver",
            BackendKind::Snowflake => "snowflake",
            BackendKind::Other(s) => s,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed connection descriptor: an explicit kind plus a pre-built
/// connection string, as produced by an external credential layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub kind: BackendKind,
    pub uri: String,
    /// Optional human-readable name used in plan summaries.
    pub name: Option<String>,
}

/// Canonical descriptor of how to reach one backend instance.
///
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    kind: BackendKind,
    connection_string: String,
    display_name: String,
}

impl Endpoint {
    /// Build an endpoint from a raw connection string, inferring the kind
    /// from its shape (see module docs for the inference contract).
    pub fn from_connection_string(raw: &str) -> Self {
        let kind = if raw.starts_with(ODBC_DRIVER_MARKER) {
            BackendKind::SqlServer
        } else {
            match raw.split_once("://") {
                Some((scheme, _)) => BackendKind::from_scheme(scheme),
                None => BackendKind::Other(raw.to_string()),
            }
        };
        let display_name = default_display_name(&kind);
        Self {
            kind,
            connection_string: raw.to_string(),
            display_name,
        }
    }

    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl From<ConnectionInfo> for Endpoint {
    fn from(info: ConnectionInfo) -> Self {
        let display_name = info
            .name
            .unwrap_or_else(|| default_display_name(&info.kind));
        Self {
            kind: info.kind,
            connection_string: info.uri,
            display_name,
        }
    }
}

impl From<&str> for Endpoint {
    fn from(raw: &str) -> Self {
        Endpoint::from_connection_string(raw)
    }
}

fn default_display_name(kind: &BackendKind) -> String {
    format!("{}_connection", kind.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infers_sqlserver_from_odbc_marker() {
        let ep = Endpoint::from_connection_string(
            "Driver={ODBC Driver 17 for SQL Server};Server=host;Database=db;",
        );
        assert_eq!(*ep.kind(), BackendKind::SqlServer);
        assert_eq!(ep.display_name(), "sqlserver_connection");
    }

    #[test]
    fn test_infers_postgres_from_scheme() {
        let ep = Endpoint::from_connection_string("postgresql://u:p@h:5432/db");
        assert_eq!(*ep.kind(), BackendKind::Postgres);
        assert_eq!(ep.connection_string(), "postgresql://u:p@h:5432/db");
        assert_eq!(ep.display_name(), "postgresql_connection");
    }

    #[test]
    fn test_infers_snowflake_from_scheme() {
        let ep = Endpoint::from_connection_string("snowflake://acct/db/schema?role=r");
        assert_eq!(*ep.kind(), BackendKind::Snowflake);
    }

    #[test]
    fn test_unknown_scheme_is_other() {
        let ep = Endpoint::from_connection_string("mysql://u:p@h/db");
        assert_eq!(*ep.kind(), BackendKind::Other("mysql".to_string()));
        assert_eq!(ep.display_name(), "mysql_connection");
    }

    #[test]
    fn test_string_without_scheme_is_other() {
        // Malformed input silently yields a possibly-wrong kind; the
        // dispatch fallback handles it.
        let ep = Endpoint::from_connection_string("not a connection string");
        assert!(matches!(ep.kind(), BackendKind::Other(_)));
    }

    #[test]
    fn test_typed_connection_keeps_explicit_kind_and_name() {
        let ep: Endpoint = ConnectionInfo {
            kind: BackendKind::Snowflake,
            uri: "Driver={SnowflakeDSIIDriver};Server=acct;".to_string(),
            name: Some("analytics".to_string()),
        }
        .into();
        assert_eq!(*ep.kind(), BackendKind::Snowflake);
        assert_eq!(ep.display_name(), "analytics");
    }

    #[test]
    fn test_typed_connection_default_name() {
        let ep: Endpoint = ConnectionInfo {
            kind: BackendKind::Postgres,
            uri: "postgresql://h/db".to_string(),
            name: None,
        }
        .into();
        assert_eq!(ep.display_name(), "postgresql_connection");
    }
}
