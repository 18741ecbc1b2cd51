//! PostgreSQL connection implementation.
//!
//! Provides `PostgresConnection`, which implements the `Connection` trait on a
//! one-connection sqlx pool and loads table data with `COPY .. FROM STDIN`.

use crate::config::ConnectionConfig;
use crate::db::errors::{connect_with_retry, statement_error};
use crate::db::{
    single_connection_pool, strip_trailing_delimiter, Backend, Connection, ExecStatus, Row, RowSet, Value,
};
use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgCopyIn, PgPool, PgPoolCopyExt, PgRow, PgSslMode, Postgres};
use sqlx::{Column, Executor, Row as SqlxRow, Statement, TypeInfo};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Bytes buffered before each `COPY` data message.
const COPY_CHUNK_BYTES: usize = 1 << 20;

/// PostgreSQL connection.
pub struct PostgresConnection {
    config: ConnectionConfig,
    pool: Option<PgPool>,
}

impl PostgresConnection {
    /// Creates an unopened connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, pool: None }
    }

    fn connect_options(&self) -> Result<PgConnectOptions> {
        let config = &self.config;
        let mut options = PgConnectOptions::new()
            .host(config.effective_host())
            .port(config.effective_port())
            .database(config.require_database()?);

        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        for (key, value) in &config.options {
            match key.as_str() {
                "sslmode" => {
                    let mode: PgSslMode = value.parse().map_err(|_| {
                        RunnerError::config(format!("Invalid sslmode '{value}'"))
                    })?;
                    options = options.ssl_mode(mode);
                }
                "application_name" => options = options.application_name(value),
                "statement_cache_capacity" => {
                    let capacity = value.parse().map_err(|_| {
                        RunnerError::config(format!("Invalid statement_cache_capacity '{value}'"))
                    })?;
                    options = options.statement_cache_capacity(capacity);
                }
                other => warn!("Ignoring unknown postgres option '{other}'"),
            }
        }

        Ok(options)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    fn is_open(&self) -> bool {
        self.pool.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let options = self.connect_options()?;
        let pool = connect_with_retry(&self.config, || {
            single_connection_pool::<Postgres>().connect_with(options.clone())
        })
        .await?;
        self.pool = Some(pool);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Closed postgres connection");
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
        // sessions run in autocommit mode; explicit transactions commit themselves
        Ok(self.pool.is_some())
    }

    async fn copy_from(&mut self, table: &str, path: &Path, delimiter: char) -> Result<ExecStatus> {
        let Some(pool) = self.pool.as_ref() else {
            return Ok(ExecStatus::Closed);
        };
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            RunnerError::not_found(format!("Cannot open data file {}: {e}", path.display()))
        })?;

        let statement = format!("COPY {table} FROM STDIN WITH (FORMAT text, DELIMITER '{delimiter}')");
        let mut copy = pool
            .copy_in_raw(&statement)
            .await
            .map_err(|e| statement_error(&statement, e))?;

        match stream_file(&mut copy, file, delimiter).await {
            Ok(()) => {
                let rows = copy
                    .finish()
                    .await
                    .map_err(|e| statement_error(&statement, e))?;
                Ok(ExecStatus::Affected(rows))
            }
            Err(e) => {
                if let Err(abort) = copy.abort(e.to_string()).await {
                    debug!("COPY abort reported: {abort}");
                }
                Err(e)
            }
        }
    }
}

async fn stream_file(
    copy: &mut PgCopyIn<PoolConnection<Postgres>>,
    file: tokio::fs::File,
    delimiter: char,
) -> Result<()> {
    let mut lines = BufReader::new(file).lines();
    let mut chunk = Vec::with_capacity(COPY_CHUNK_BYTES);

    while let Some(line) = lines.next_line().await? {
        chunk.extend_from_slice(strip_trailing_delimiter(&line, delimiter).as_bytes());
        chunk.push(b'\n');
        if chunk.len() >= COPY_CHUNK_BYTES {
            copy.send(std::mem::take(&mut chunk))
                .await
                .map_err(|e| RunnerError::statement("COPY", e))?;
        }
    }
    if !chunk.is_empty() {
        copy.send(chunk)
            .await
            .map_err(|e| RunnerError::statement("COPY", e))?;
    }
    Ok(())
}

/// Prepares the statement for its column description, then fetches every row.
async fn fetch_row_set(pool: &PgPool, statement: &str) -> std::result::Result<RowSet, sqlx::Error> {
    let prepared = pool.prepare(statement).await?;
    let columns = prepared
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let rows = prepared.query().fetch_all(pool).await?;
    Ok(RowSet::new(columns, rows.iter().map(convert_row).collect()))
}

/// Converts a PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)
            .ok()
            .flatten()
            .map(Value::Decimal)
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // CHAR, VARCHAR, TEXT and anything else decodable as text
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
