//! Connection retry and sqlx error mapping shared by the server backends.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::error::RunnerError;

/// Maximum number of connection attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Runs `attempt` until it succeeds, retrying transient failures with backoff.
pub(crate) async fn connect_with_retry<T, F, Fut>(
    config: &ConnectionConfig,
    mut attempt: F,
) -> Result<T, RunnerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut n = 1;

    loop {
        debug!("Connection attempt {} of {}", n, MAX_RETRY_ATTEMPTS);
        match attempt().await {
            Ok(conn) => {
                debug!("Connected to {}", config.display_string());
                return Ok(conn);
            }
            Err(e) if n < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                warn!(
                    "Connection attempt {} failed (transient error), retrying in {:?}",
                    n, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                n += 1;
            }
            Err(e) => return Err(map_connection_error(e, config)),
        }
    }
}

/// Determines if an error is transient and worth retrying.
pub(crate) fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }
    let error_str = error.to_string().to_lowercase();
    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
pub(crate) fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> RunnerError {
    let host = config.effective_host();
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        RunnerError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") || error_str.contains("access denied") {
        RunnerError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("unknown database")
        || (error_str.contains("does not exist") && error_str.contains("database"))
    {
        RunnerError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("unable to open database file") {
        RunnerError::connection(format!("Cannot open database file '{database}'."))
    } else if error_str.contains("timed out") {
        RunnerError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        RunnerError::connection(error.to_string())
    }
}

/// Wraps a failed statement with its text and the database's message.
pub(crate) fn statement_error(statement: &str, error: sqlx::Error) -> RunnerError {
    let cause = match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    };
    RunnerError::statement(statement, cause)
}
