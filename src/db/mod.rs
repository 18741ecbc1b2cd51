//! Backend abstraction layer.
//!
//! Provides one async connection contract over different client libraries,
//! a closed set of backend variants selected by tag, and scoped acquisition
//! that always closes the connection on the way out.

#[cfg(feature = "duckdb")]
mod duckdb;
mod errors;
mod load;
mod mysql;
mod postgres;
pub mod script;
mod sqlite;
mod types;

#[cfg(feature = "duckdb")]
pub use self::duckdb::DuckDbConnection;
pub use load::{insert_rows, quote_literal, strip_trailing_delimiter, INSERT_BATCH_ROWS};
pub use mysql::{drop_index_statement, MySqlConnection, IDX_DROP_QUERY, IDX_INDEX_QUERY};
pub use postgres::PostgresConnection;
pub use script::StatementKind;
pub use sqlite::SqliteConnection;
pub use types::{ExecStatus, QueryOutcome, Row, RowSet, Value};

use crate::config::ConnectionConfig;
use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::pool::PoolOptions;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Seconds to wait for the pooled connection before giving up.
const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    MySql,
    Sqlite,
    DuckDb,
}

impl Backend {
    /// All variants, in display order.
    pub const ALL: [Backend; 4] = [
        Backend::Postgres,
        Backend::MySql,
        Backend::Sqlite,
        Backend::DuckDb,
    ];

    /// Returns the backend as a string for persistence and directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::DuckDb => "duckdb",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            "mysql" => Some(Self::MySql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "duckdb" => Some(Self::DuckDb),
            _ => None,
        }
    }

    /// Parses a backend from a connection string scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::parse(scheme)
    }

    /// Returns the default port for this backend (0 for embedded backends).
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::MySql => 3306,
            Self::Sqlite | Self::DuckDb => 0,
        }
    }

    /// Returns true for file-backed backends without a server.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Sqlite | Self::DuckDb)
    }

    /// Schema scripts run by `create_tables`, in order.
    pub fn schema_scripts(&self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["table_schema.sql", "pg_constraints.sql"],
            Self::MySql => &["table_schema.sql", "mysql_pkeys.sql"],
            Self::Sqlite | Self::DuckDb => &["table_schema.sql"],
        }
    }

    /// Statement that empties a table.
    pub fn truncate_statement(&self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("delete from {table}"),
            Self::Postgres => format!("truncate table {table} cascade"),
            _ => format!("truncate table {table}"),
        }
    }

    /// Statement that drops a table if present.
    pub fn drop_statement(&self, table: &str) -> String {
        format!("drop table if exists {table}")
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates an unopened connection for the given configuration.
///
/// This is the central factory for backend variants. The connection opens
/// lazily on first `open()` or scoped acquisition.
pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    match config.backend {
        Backend::Postgres => Ok(Box::new(PostgresConnection::new(config.clone()))),
        Backend::MySql => Ok(Box::new(MySqlConnection::new(config.clone()))),
        Backend::Sqlite => Ok(Box::new(SqliteConnection::new(config.clone()))),
        #[cfg(feature = "duckdb")]
        Backend::DuckDb => Ok(Box::new(DuckDbConnection::new(config.clone()))),
        #[cfg(not(feature = "duckdb"))]
        Backend::DuckDb => Err(RunnerError::config(
            "This build has no DuckDB support; rebuild with `--features duckdb`",
        )),
    }
}

/// Pool options for a backend session: one connection that is never reaped.
///
/// Holding the only connection of a pool keeps session state (an open
/// `BEGIN`, an in-memory database) across statements, while `&Pool` runs
/// queries as an executor.
pub(crate) fn single_connection_pool<DB: sqlx::Database>() -> PoolOptions<DB> {
    PoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
}

/// Connection contract shared by every backend.
///
/// `open` is idempotent; `close` is safe on a closed connection and leaves
/// the handle reopenable. The low-level primitives report a closed handle as
/// a value (`ExecStatus::Closed`, `None`); statement failures are errors that
/// name the statement.
#[async_trait]
pub trait Connection: Send {
    /// Backend tag of this connection.
    fn backend(&self) -> Backend;

    /// Returns true while a handle is held.
    fn is_open(&self) -> bool;

    /// Establishes the underlying connection if not already established.
    async fn open(&mut self) -> Result<()>;

    /// Releases the underlying connection. Safe to call when already closed.
    async fn close(&mut self);

    /// Runs a single statement and returns the affected row count.
    async fn execute(&mut self, statement: &str) -> Result<ExecStatus>;

    /// Runs a single statement and fetches its rows. `None` when closed.
    async fn fetch(&mut self, statement: &str) -> Result<Option<RowSet>>;

    /// Commits pending work. Returns false when no connection is open.
    ///
    /// Connections run in autocommit mode, so outside an explicit `BEGIN`
    /// (the batched-insert loader issues its own `COMMIT`) this only reports
    /// whether a handle is held.
    async fn commit(&mut self) -> Result<bool>;

    /// Decides how a script statement is executed.
    fn classify(&self, statement: &str) -> StatementKind {
        script::classify(statement)
    }

    /// Runs every statement of a script file, stopping at the first failure.
    async fn execute_script(&mut self, path: &Path) -> Result<QueryOutcome> {
        if !self.is_open() {
            return Err(RunnerError::connection("database has been closed"));
        }
        let statements = script::read_statements(path)?;
        run_statements(self, &statements).await
    }

    /// Loads a delimited text file into a table.
    ///
    /// The default issues batched inserts; backends with a native bulk path
    /// override it.
    async fn copy_from(&mut self, table: &str, path: &Path, delimiter: char) -> Result<ExecStatus> {
        insert_rows(self, table, path, delimiter).await
    }
}

/// Runs statements in order and returns the outcome of the script.
///
/// The outcome is that of the last statement that returned rows; statements
/// without a result (a `drop view` after the query in Q15, say) do not
/// discard it. A script without any row-returning statement reports the last
/// command's count.
pub async fn run_statements<C>(conn: &mut C, statements: &[String]) -> Result<QueryOutcome>
where
    C: Connection + ?Sized,
{
    let mut outcome = QueryOutcome::command(0);

    for stmt in statements {
        let kind = conn.classify(stmt);
        debug!(kind = %kind, statement = %stmt, "executing");

        let step = match kind {
            StatementKind::Read => match conn.fetch(stmt).await? {
                Some(set) => QueryOutcome::rows(set),
                None => return Err(closed_during(stmt)),
            },
            StatementKind::Command => match conn.execute(stmt).await? {
                ExecStatus::Affected(n) => QueryOutcome::command(n as i64),
                ExecStatus::Closed => return Err(closed_during(stmt)),
            },
            StatementKind::Other => match conn.fetch(stmt).await? {
                Some(set) if set.has_description() => QueryOutcome::rows(set),
                Some(_) => QueryOutcome::command(0),
                None => return Err(closed_during(stmt)),
            },
        };

        if step.has_rows() || !outcome.has_rows() {
            outcome = step;
        }
    }

    Ok(outcome)
}

fn closed_during(statement: &str) -> RunnerError {
    RunnerError::statement(statement, "database has been closed")
}

/// Opens the connection, runs `body`, and closes the connection on every exit path.
///
/// ```ignore
/// let outcome = scoped(conn, move |c| Box::pin(async move {
///     c.execute_script(&path).await
/// })).await?;
/// ```
pub async fn scoped<C, T, F>(conn: &mut C, body: F) -> Result<T>
where
    C: Connection + ?Sized,
    T: Send,
    F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<T>>,
{
    if let Err(e) = conn.open().await {
        conn.close().await;
        return Err(e);
    }
    let result = body(conn).await;
    conn.close().await;
    result
}
