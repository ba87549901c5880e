//! Logical column types and table schemas.
//!
//! The taxonomy here is backend-neutral: drivers map their native column
//! metadata into it on read, and the type translator maps it back out to
//! per-backend DDL on write. Types outside the taxonomy travel as
//! [`DataType::Unknown`] carrying the backend's own type name, so a schema
//! can always be represented even when a column is not understood.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Timestamp resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

/// Backend-neutral logical column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Utf8,
    Binary,
    /// Days since the Unix epoch.
    Date32,
    /// Milliseconds since the Unix epoch, date-valued.
    Date64,
    Timestamp(TimeUnit),
    /// A type outside the taxonomy; carries the source backend's type name.
    Unknown(String),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "boolean"),
            DataType::Int8 => write!(f, "int8"),
            DataType::Int16 => write!(f, "int16"),
            DataType::Int32 => write!(f, "int32"),
            DataType::Int64 => write!(f, "int64"),
            DataType::UInt8 => write!(f, "uint8"),
            DataType::UInt16 => write!(f, "uint16"),
            DataType::UInt32 => write!(f, "uint32"),
            DataType::UInt64 => write!(f, "uint64"),
            DataType::Float16 => write!(f, "float16"),
            DataType::Float32 => write!(f, "float32"),
            DataType::Float64 => write!(f, "float64"),
            DataType::Utf8 => write!(f, "utf8"),
            DataType::Binary => write!(f, "binary"),
            DataType::Date32 => write!(f, "date32"),
            DataType::Date64 => write!(f, "date64"),
            DataType::Timestamp(unit) => write!(f, "timestamp[{unit:?}]"),
            DataType::Unknown(name) => write!(f, "unknown({name})"),
        }
    }
}

/// One column: name, logical type, nullability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Ordered list of fields describing one table or result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn into_shared(self) -> Arc<Schema> {
        Arc::new(self)
    }
}
