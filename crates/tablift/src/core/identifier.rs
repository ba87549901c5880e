//! Qualified table name normalization and quoting.
//!
//! Table names arrive as dotted strings whose parts may already carry
//! double-quote or bracket quoting from another tool. This module strips any
//! existing quoting, keeps the bare parts, and renders one canonical
//! double-quoted form. Normalizing an already-normalized name yields the
//! same string, so names can pass through the pipeline any number of times.
//!
//! No identifier-legality validation happens here (length, character set);
//! anything beyond quote normalization is the caller's responsibility.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dotted table identifier with up to three parts:
/// `database.schema.table`, `schema.table`, or `table`.
///
/// Parts are stored unquoted. The trailing part is always the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedName {
    parts: Vec<String>,
}

impl QualifiedName {
    /// Parse a dotted name, stripping any `"`, `[`, `]` quoting from each part.
    pub fn parse(raw: &str) -> Self {
        let parts = raw
            .split('.')
            .map(|part| {
                part.chars()
                    .filter(|c| !matches!(c, '"' | '[' | ']'))
                    .collect::<String>()
            })
            .collect();
        Self { parts }
    }

    /// The table part (trailing segment).
    pub fn table(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }

    /// The schema part, if the name has at least two segments.
    pub fn schema(&self) -> Option<&str> {
        if self.parts.len() >= 2 {
            Some(&self.parts[self.parts.len() - 2])
        } else {
            None
        }
    }

    /// The database part, if the name has at least three segments.
    pub fn database(&self) -> Option<&str> {
        if self.parts.len() >= 3 {
            Some(&self.parts[self.parts.len() - 3])
        } else {
            None
        }
    }

    /// Canonical rendering: every part double-quoted, joined with `.`.
    pub fn quoted(&self) -> String {
        self.parts
            .iter()
            .map(|p| quote_ident(p))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<&str> for QualifiedName {
    fn from(raw: &str) -> Self {
        QualifiedName::parse(raw)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

/// Wrap an identifier in double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}
