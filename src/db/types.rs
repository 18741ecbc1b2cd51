//! Query outcome types.
//!
//! Defines the structures every backend hands back to the orchestrator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of the lowest execution primitive.
///
/// A closed connection is reported as a value, not an error, so bulk loops
/// (truncate, drop) can skip without unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// No connection is open; nothing was executed.
    Closed,
    /// Statement ran; number of rows affected (0 for DDL).
    Affected(u64),
}

impl ExecStatus {
    /// Returns true if the statement did not run because the connection was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the affected-row count, or `None` when closed.
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Closed => None,
            Self::Affected(n) => Some(*n),
        }
    }
}

/// Column names plus rows returned by a read statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// A statement with no result description yields no columns.
    pub fn has_description(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Outcome of running a script or a query file.
///
/// `rows` and `columns` are present only for read-returning statements and
/// absent (not empty) for DDL/DML. When present, `row_count == rows.len()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub row_count: i64,
    pub rows: Option<Vec<Row>>,
    pub columns: Option<Vec<String>>,
}

impl QueryOutcome {
    /// Outcome of a statement that returns no rows.
    pub fn command(row_count: i64) -> Self {
        Self {
            row_count,
            rows: None,
            columns: None,
        }
    }

    /// Outcome of a read statement.
    pub fn rows(set: RowSet) -> Self {
        Self {
            row_count: set.rows.len() as i64,
            rows: Some(set.rows),
            columns: Some(set.columns),
        }
    }

    /// Outcome recorded for a query that raised.
    pub fn failed() -> Self {
        Self::command(-1)
    }

    /// Returns true if this outcome carries a row set.
    pub fn has_rows(&self) -> bool {
        self.rows.is_some()
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Exact numeric (NUMERIC/DECIMAL columns).
    Decimal(Decimal),

    /// Text/string value; dates and timestamps are rendered into this too.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders the value as a CSV cell. NULL becomes an empty cell.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Renders the value for terminal output.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            other => other.to_csv_field(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
