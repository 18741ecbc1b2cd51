//! MySQL connection implementation using sqlx.

use crate::config::ConnectionConfig;
use crate::db::errors::{connect_with_retry, statement_error};
use crate::db::{script, single_connection_pool, Backend, Connection, ExecStatus, Row, RowSet, Value};
use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlRow, MySqlSslMode};
use sqlx::{Column, Executor, Row as SqlxRow, Statement, TypeInfo};
use tracing::{debug, warn};

/// Lists the secondary `IDX%` indexes of the connected schema.
pub const IDX_INDEX_QUERY: &str = "SELECT DISTINCT(INDEX_NAME) FROM INFORMATION_SCHEMA.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND INDEX_NAME LIKE 'IDX%'";

/// Lists the `IDX%` indexes of the connected schema with their tables.
pub const IDX_DROP_QUERY: &str = "SELECT DISTINCT INDEX_NAME, TABLE_NAME FROM INFORMATION_SCHEMA.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND INDEX_NAME LIKE 'IDX%'";

/// Statement dropping one secondary index.
pub fn drop_index_statement(index: &str, table: &str) -> String {
    format!("drop index {index} on {table}")
}

/// MySQL connection.
///
/// Data loads use the shared batched-`INSERT` path rather than
/// `LOAD DATA LOCAL INFILE`: sqlx does not answer the server's local-file
/// request, and the server-side `LOAD DATA INFILE` needs the file on the
/// database host.
pub struct MySqlConnection {
    config: ConnectionConfig,
    pool: Option<MySqlPool>,
}

impl MySqlConnection {
    /// Creates an unopened connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, pool: None }
    }

    /// Builds connection options without embedding credentials in a URL.
    fn connect_options(&self) -> Result<MySqlConnectOptions> {
        let config = &self.config;
        let mut options = MySqlConnectOptions::new()
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
                "ssl_mode" => {
                    let mode: MySqlSslMode = value.parse().map_err(|_| {
                        RunnerError::config(format!("Invalid ssl_mode '{value}'"))
                    })?;
                    options = options.ssl_mode(mode);
                }
                "charset" => options = options.charset(value),
                "statement_cache_capacity" => {
                    let capacity = value.parse().map_err(|_| {
                        RunnerError::config(format!("Invalid statement_cache_capacity '{value}'"))
                    })?;
                    options = options.statement_cache_capacity(capacity);
                }
                other => warn!("Ignoring unknown mysql option '{other}'"),
            }
        }

        Ok(options)
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn backend(&self) -> Backend {
        Backend::MySql
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
            single_connection_pool::<MySql>().connect_with(options.clone())
        })
        .await?;
        self.pool = Some(pool);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Closed mysql connection");
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
        // Maintenance statements (optimize, show, ...) are not all preparable.
        let fetched = if script::leading_keyword(statement) == "select" {
            fetch_prepared(pool, statement).await
        } else {
            fetch_unprepared(pool, statement).await
        };
        fetched.map(Some).map_err(|e| statement_error(statement, e))
    }

    async fn commit(&mut self) -> Result<bool> {
        Ok(self.pool.is_some())
    }
}

async fn fetch_prepared(pool: &MySqlPool, statement: &str) -> std::result::Result<RowSet, sqlx::Error> {
    let prepared = pool.prepare(statement).await?;
    let columns = prepared
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let rows = prepared.query().fetch_all(pool).await?;
    Ok(RowSet::new(columns, rows.iter().map(convert_row).collect()))
}

async fn fetch_unprepared(pool: &MySqlPool, statement: &str) -> std::result::Result<RowSet, sqlx::Error> {
    let rows = sqlx::raw_sql(statement).fetch_all(pool).await?;
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|col| col.name().to_string()).collect())
        .unwrap_or_default();
    Ok(RowSet::new(columns, rows.iter().map(convert_row).collect()))
}

fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    let upper = type_name.to_uppercase();
    match upper.as_str() {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        t if t.ends_with("UNSIGNED") => row
            .try_get::<Option<u64>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "DOUBLE" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DECIMAL" => row
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

        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
