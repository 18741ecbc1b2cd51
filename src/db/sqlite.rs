//! SQLite connection implementation.
//!
//! Runs the benchmark against a database file through a one-connection sqlx
//! pool. Data loads use the shared batched-insert path.

use crate::config::ConnectionConfig;
use crate::db::errors::{map_connection_error, statement_error};
use crate::db::{single_connection_pool, Backend, Connection, ExecStatus, Row, RowSet, Value};
use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow};
use sqlx::{Column, Executor, Row as SqlxRow, Statement, TypeInfo, ValueRef};
use tracing::{debug, warn};

/// SQLite connection.
///
/// The pool never holds more than one connection, so every statement runs on
/// the same session.
pub struct SqliteConnection {
    config: ConnectionConfig,
    pool: Option<SqlitePool>,
}

impl SqliteConnection {
    /// Creates an unopened connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, pool: None }
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let mut options = SqliteConnectOptions::new()
            .filename(self.config.require_database()?)
            .create_if_missing(true);

        for (key, value) in &self.config.options {
            match key.as_str() {
                "journal_mode" => {
                    let mode: SqliteJournalMode = value.parse().map_err(|_| {
                        RunnerError::config(format!("Invalid journal_mode '{value}'"))
                    })?;
                    options = options.journal_mode(mode);
                }
                "foreign_keys" => {
                    let on = value.parse().map_err(|_| {
                        RunnerError::config(format!("Invalid foreign_keys '{value}'"))
                    })?;
                    options = options.foreign_keys(on);
                }
                other => warn!("Ignoring unknown sqlite option '{other}'"),
            }
        }

        Ok(options)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn is_open(&self) -> bool {
        self.pool.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let options = self.connect_options()?;
        let pool = single_connection_pool::<Sqlite>()
            .connect_with(options)
            .await
            .map_err(|e| map_connection_error(e, &self.config))?;
        self.pool = Some(pool);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Closed sqlite connection");
        }
    }

    async fn execute(&mut self, statement: &str) -> Result<ExecStatus> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(ExecStatus::Closed);
        };
        let done = sqlx::raw_sql(statement)
            .execute(pool)
            .await
            .map_err(|e| statement_error(statement, e))?;
        Ok(ExecStatus::Affected(done.rows_affected()))
    }

    async fn fetch(&mut self, statement: &str) -> Result<Option<RowSet>> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(None);
        };
        let set = fetch_row_set(pool, statement)
            .await
            .map_err(|e| statement_error(statement, e))?;
        Ok(Some(set))
    }

    async fn commit(&mut self) -> Result<bool> {
        Ok(self.pool.is_some())
    }
}

async fn fetch_row_set(pool: &SqlitePool, statement: &str) -> std::result::Result<RowSet, sqlx::Error> {
    let prepared = pool.prepare(statement).await?;
    let columns = prepared
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let rows = prepared.query().fetch_all(pool).await?;
    Ok(RowSet::new(columns, rows.iter().map(convert_row).collect()))
}

fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Decodes by the storage class of the value itself; SQLite columns are
/// dynamically typed and expression columns carry no declared type.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "INT8" | "BIGINT" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get_unchecked::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
