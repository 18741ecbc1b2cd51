//! Batched-insert loading for backends without a native bulk path.

use std::fs::File;
use std::path::Path;

use tracing::{debug, warn};

use super::{Backend, Connection, ExecStatus};
use crate::error::{Result, RunnerError};

/// Rows per generated `INSERT` statement.
pub const INSERT_BATCH_ROWS: usize = 500;

/// Strips one trailing delimiter from a dbgen `.tbl` line.
pub fn strip_trailing_delimiter(line: &str, delimiter: char) -> &str {
    line.strip_suffix(delimiter).unwrap_or(line)
}

/// Renders a field as a SQL literal. Empty fields become NULL.
pub fn quote_literal(field: &str, backend: Backend) -> String {
    if field.is_empty() {
        return "NULL".to_string();
    }
    let mut escaped = field.replace('\'', "''");
    if backend == Backend::MySql {
        escaped = escaped.replace('\\', "\\\\");
    }
    format!("'{escaped}'")
}

fn open_reader(path: &Path, delimiter: char) -> Result<csv::Reader<File>> {
    let delimiter = u8::try_from(delimiter).map_err(|_| {
        RunnerError::config(format!("Delimiter '{delimiter}' is not a single-byte character"))
    })?;
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .quoting(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| RunnerError::not_found(format!("Cannot open data file {}: {e}", path.display())))
}

fn render_tuple(record: &csv::StringRecord, backend: Backend) -> String {
    let mut fields: Vec<&str> = record.iter().collect();
    // dbgen terminates every line with the delimiter
    if fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    let literals: Vec<String> = fields.iter().map(|f| quote_literal(f, backend)).collect();
    format!("({})", literals.join(", "))
}

async fn flush<C>(conn: &mut C, table: &str, tuples: &mut Vec<String>) -> Result<u64>
where
    C: Connection + ?Sized,
{
    if tuples.is_empty() {
        return Ok(0);
    }
    let statement = format!("insert into {table} values {}", tuples.join(", "));
    tuples.clear();
    match conn.execute(&statement).await? {
        ExecStatus::Affected(n) => Ok(n),
        ExecStatus::Closed => Err(RunnerError::connection("database has been closed")),
    }
}

/// Loads a delimited file with batched `INSERT` statements inside one transaction.
pub async fn insert_rows<C>(conn: &mut C, table: &str, path: &Path, delimiter: char) -> Result<ExecStatus>
where
    C: Connection + ?Sized,
{
    if !conn.is_open() {
        return Ok(ExecStatus::Closed);
    }
    let mut reader = open_reader(path, delimiter)?;
    let backend = conn.backend();

    conn.execute("BEGIN").await?;
    let loaded = insert_batches(conn, backend, table, &mut reader, path).await;

    match loaded {
        Ok(total) => {
            conn.execute("COMMIT").await?;
            debug!(table, rows = total, "batched insert committed");
            Ok(ExecStatus::Affected(total))
        }
        Err(e) => {
            if let Err(rollback) = conn.execute("ROLLBACK").await {
                warn!("Rollback after failed load of {table} failed: {rollback}");
            }
            Err(e)
        }
    }
}

async fn insert_batches<C>(
    conn: &mut C,
    backend: Backend,
    table: &str,
    reader: &mut csv::Reader<File>,
    path: &Path,
) -> Result<u64>
where
    C: Connection + ?Sized,
{
    let mut total = 0;
    let mut tuples = Vec::with_capacity(INSERT_BATCH_ROWS);
    let mut record = csv::StringRecord::new();

    loop {
        let more = reader.read_record(&mut record).map_err(|e| {
            RunnerError::internal(format!("Cannot parse {}: {e}", path.display()))
        })?;
        if !more {
            break;
        }
        tuples.push(render_tuple(&record, backend));
        if tuples.len() == INSERT_BATCH_ROWS {
            total += flush(conn, table, &mut tuples).await?;
        }
    }
    total += flush(conn, table, &mut tuples).await?;

    Ok(total)
}
