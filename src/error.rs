//! Error types for tpch-runner.
//!
//! Defines the main error enum used throughout the harness.

use thiserror::Error;

/// Main error type for runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Backend connection errors (host unreachable, auth failed, closed handle, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single statement of a script failed; the rest of the script was skipped.
    #[error("Statement {statement} fails, exception: {cause}")]
    Statement { statement: String, cause: String },

    /// A referenced power test, test result, or artifact does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A test result owned by a power test was addressed directly.
    #[error("Ownership conflict: {0}")]
    OwnershipConflict(String),

    /// Configuration errors (invalid config file, unknown table, bad connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata store errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Result artifacts that cannot be read or compared.
    #[error("Comparison error: {0}")]
    Comparison(String),

    /// Filesystem errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunnerError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a statement error naming the failing statement and its cause.
    pub fn statement(statement: impl Into<String>, cause: impl ToString) -> Self {
        Self::Statement {
            statement: statement.into(),
            cause: cause.to_string(),
        }
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an ownership-conflict error with the given message.
    pub fn ownership(msg: impl Into<String>) -> Self {
        Self::OwnershipConflict(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a comparison error with the given message.
    pub fn comparison(msg: impl Into<String>) -> Self {
        Self::Comparison(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Statement { .. } => "Statement Error",
            Self::NotFound(_) => "Not Found",
            Self::OwnershipConflict(_) => "Ownership Conflict",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Comparison(_) => "Comparison Error",
            Self::Io(_) => "I/O Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using RunnerError.
pub type Result<T> = std::result::Result<T, RunnerError>;
