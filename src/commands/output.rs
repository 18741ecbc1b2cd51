//! Transport-agnostic command output types.
//!
//! Handlers return these; the binary renders them as text or JSON.

use serde_json::{json, Map, Value as JsonValue};

use crate::artifact::ResultTable;

/// Output from a command handler.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Informational message.
    Info(String),

    /// Tabular data.
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },

    /// Several outputs, rendered in order.
    Multiple(Vec<CommandOutput>),
}

impl CommandOutput {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::Info(msg.into())
    }

    pub fn table(headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self::Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    /// Wraps a CSV artifact.
    pub fn from_result_table(table: ResultTable) -> Self {
        Self::Table {
            headers: table.headers,
            rows: table.rows,
        }
    }

    /// Plain text rendering.
    pub fn render_text(&self) -> String {
        match self {
            Self::Info(msg) => msg.clone(),
            Self::Table { headers, rows } => {
                ResultTable::new(headers.clone(), rows.clone()).render()
            }
            Self::Multiple(outputs) => outputs
                .iter()
                .map(Self::render_text)
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// JSON rendering; tables become arrays of objects keyed by header.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Info(msg) => json!({ "message": msg }),
            Self::Table { headers, rows } => JsonValue::Array(
                rows.iter()
                    .map(|row| {
                        let object: Map<String, JsonValue> = headers
                            .iter()
                            .cloned()
                            .zip(row.iter().map(|cell| JsonValue::String(cell.clone())))
                            .collect();
                        JsonValue::Object(object)
                    })
                    .collect(),
            ),
            Self::Multiple(outputs) => JsonValue::Array(outputs.iter().map(Self::to_json).collect()),
        }
    }
}
