//! SQL script reading and statement classification.
//!
//! Scripts are plain text: `--` comment lines, statements terminated by `;`,
//! statements free to span lines. Classification is by leading keyword.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, RunnerError};

/// Comment marker for whole-line comments.
pub const COMMENT_MARKER: &str = "--";

/// Statement terminator.
pub const TERMINATOR: char = ';';

/// How a statement is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Read statement (`select`): always fetch rows and columns.
    Read,
    /// DDL or maintenance (`create`, `drop`, `update`, `analyze`): execute without fetch.
    Command,
    /// Anything else: fetch, and report rows only if the backend describes a result.
    Other,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Command => write!(f, "COMMAND"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

const COMMAND_KEYWORDS: &[&str] = &["create", "drop", "update", "analyze"];

/// Classifies a statement by its leading keyword.
pub fn classify(statement: &str) -> StatementKind {
    let keyword = leading_keyword(statement);
    if keyword == "select" {
        StatementKind::Read
    } else if COMMAND_KEYWORDS.contains(&keyword.as_str()) {
        StatementKind::Command
    } else {
        StatementKind::Other
    }
}

/// Returns the first word of a statement, lowercased.
pub fn leading_keyword(statement: &str) -> String {
    statement
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Strips comment and blank lines, then joins continuation lines into one text.
pub fn normalize_script(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .collect::<Vec<_>>()
        .join(" ");
    whitespace_run().replace_all(&joined, " ").into_owned()
}

/// Splits normalized script text into non-empty statements.
pub fn split_statements(text: &str) -> Vec<String> {
    text.split(TERMINATOR)
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(String::from)
        .collect()
}

/// Reads a script file and returns its statements in order.
pub fn read_statements(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        RunnerError::not_found(format!("Cannot read SQL file {}: {e}", path.display()))
    })?;
    Ok(split_statements(&normalize_script(&text)))
}
