//! DuckDB connection implementation.
//!
//! The duckdb client is synchronous; each call runs on the blocking pool
//! against a connection shared behind a mutex.

use crate::config::ConnectionConfig;
use crate::db::{strip_trailing_delimiter, Backend, Connection, ExecStatus, Row, RowSet, Value};
use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use duckdb::types::Value as DuckValue;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

type Shared = Arc<Mutex<duckdb::Connection>>;

/// DuckDB connection over a database file.
pub struct DuckDbConnection {
    config: ConnectionConfig,
    conn: Option<Shared>,
}

impl DuckDbConnection {
    /// Creates an unopened connection.
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config, conn: None }
    }
}

/// Runs `f` on the blocking pool. `None` when the connection is closed.
async fn run_blocking<T, F>(shared: Option<Shared>, f: F) -> Result<Option<T>>
where
    T: Send + 'static,
    F: FnOnce(&duckdb::Connection) -> Result<T> + Send + 'static,
{
    let Some(shared) = shared else {
        return Ok(None);
    };
    tokio::task::spawn_blocking(move || {
        let guard = shared
            .lock()
            .map_err(|_| RunnerError::internal("DuckDB connection lock poisoned"))?;
        f(&guard)
    })
    .await
    .map_err(|e| RunnerError::internal(e.to_string()))?
    .map(Some)
}

#[async_trait]
impl Connection for DuckDbConnection {
    fn backend(&self) -> Backend {
        Backend::DuckDb
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        for key in self.config.options.keys() {
            warn!("Ignoring unknown duckdb option '{key}'");
        }
        let path = self.config.require_database()?.to_string();
        let conn = tokio::task::spawn_blocking(move || duckdb::Connection::open(&path))
            .await
            .map_err(|e| RunnerError::internal(e.to_string()))?
            .map_err(|e| RunnerError::connection(format!("Cannot open DuckDB file: {e}")))?;
        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    async fn close(&mut self) {
        // the file handle is released when the last reference drops
        self.conn = None;
    }

    async fn execute(&mut self, statement: &str) -> Result<ExecStatus> {
        let sql = statement.to_string();
        let affected = run_blocking(self.conn.clone(), move |conn| {
            conn.execute(&sql, duckdb::params![])
                .map_err(|e| RunnerError::statement(&sql, e))
        })
        .await?;
        Ok(affected.map_or(ExecStatus::Closed, |n| ExecStatus::Affected(n as u64)))
    }

    async fn fetch(&mut self, statement: &str) -> Result<Option<RowSet>> {
        let sql = statement.to_string();
        run_blocking(self.conn.clone(), move |conn| {
            fetch_row_set(conn, &sql).map_err(|e| RunnerError::statement(&sql, e))
        })
        .await
    }

    async fn commit(&mut self) -> Result<bool> {
        Ok(self.conn.is_some())
    }

    /// Native `COPY`. dbgen's trailing delimiter would read as an extra
    /// column, so such files are copied through a stripped temporary file.
    async fn copy_from(&mut self, table: &str, path: &Path, delimiter: char) -> Result<ExecStatus> {
        let table = table.to_string();
        let path = path.to_path_buf();
        let copied = run_blocking(self.conn.clone(), move |conn| {
            let stripped = strip_to_temp(&path, delimiter)?;
            let source = stripped.as_deref().unwrap_or(&path);
            let file = source.to_string_lossy().replace('\'', "''");
            let statement = format!(
                "copy {table} from '{file}' (delimiter '{delimiter}', header false, auto_detect false)"
            );
            let copied = conn
                .execute(&statement, duckdb::params![])
                .map_err(|e| RunnerError::statement(&statement, e));
            if let Some(temp) = &stripped {
                if let Err(e) = std::fs::remove_file(temp) {
                    warn!("Cannot remove {}: {e}", temp.display());
                }
            }
            copied
        })
        .await?;
        Ok(copied.map_or(ExecStatus::Closed, |n| ExecStatus::Affected(n as u64)))
    }
}

/// Writes a copy of `path` without trailing delimiters when its first line
/// has one. `None` when the file loads as is.
fn strip_to_temp(path: &Path, delimiter: char) -> Result<Option<PathBuf>> {
    let open = |p: &Path| {
        File::open(p).map_err(|e| {
            RunnerError::not_found(format!("Cannot open data file {}: {e}", p.display()))
        })
    };
    let mut first = String::new();
    BufReader::new(open(path)?).read_line(&mut first)?;
    if !first.trim_end_matches(['\r', '\n']).ends_with(delimiter) {
        return Ok(None);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let temp = std::env::temp_dir().join(format!(
        "tpch-runner-{}-{}-{name}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ));
    let mut writer = BufWriter::new(File::create(&temp)?);
    for line in BufReader::new(open(path)?).lines() {
        let line = line?;
        writeln!(writer, "{}", strip_trailing_delimiter(line.trim_end_matches('\r'), delimiter))?;
    }
    writer.flush()?;
    Ok(Some(temp))
}

fn fetch_row_set(conn: &duckdb::Connection, sql: &str) -> duckdb::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(duckdb::params![])?;
    let columns = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values: Row = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(convert_value(row.get::<_, DuckValue>(i)?));
        }
        out.push(values);
    }
    Ok(RowSet::new(columns, out))
}

fn convert_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(v) => Value::Int(v.into()),
        DuckValue::SmallInt(v) => Value::Int(v.into()),
        DuckValue::Int(v) => Value::Int(v.into()),
        DuckValue::BigInt(v) => Value::Int(v),
        DuckValue::HugeInt(v) => i64::try_from(v)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::String(v.to_string())),
        DuckValue::UTinyInt(v) => Value::Int(v.into()),
        DuckValue::USmallInt(v) => Value::Int(v.into()),
        DuckValue::UInt(v) => Value::Int(v.into()),
        DuckValue::UBigInt(v) => i64::try_from(v)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::String(v.to_string())),
        DuckValue::Float(v) => Value::Float(v.into()),
        DuckValue::Double(v) => Value::Float(v),
        DuckValue::Decimal(d) => Value::Decimal(d),
        DuckValue::Text(s) => Value::String(s),
        DuckValue::Blob(b) => Value::Bytes(b),
        DuckValue::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(days.into())))
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        other => Value::String(format!("{other:?}")),
    }
}
