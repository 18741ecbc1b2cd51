//! Per-query test results.
//!
//! A result with no `result_folder` is a stand-alone run; otherwise it belongs
//! to the power test owning that folder.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{FromRow, Transaction};

use crate::db::Backend;
use crate::error::{Result, RunnerError};

/// A persisted query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub id: i64,
    pub start_time: NaiveDateTime,
    pub backend: Backend,
    pub success: bool,
    pub row_count: i64,
    /// File name of the CSV artifact, relative to its folder.
    pub result_csv: String,
    /// Query index, `1` ..= `22`.
    pub query_name: String,
    pub runtime: f64,
    pub result_folder: Option<String>,
}

impl TestResult {
    /// Returns true if the result belongs to a power test.
    pub fn is_owned(&self) -> bool {
        self.result_folder.is_some()
    }

    /// Query index parsed from `query_name`.
    pub fn query_index(&self) -> Option<usize> {
        self.query_name.parse().ok()
    }
}

/// Fields of a result about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTestResult {
    pub start_time: NaiveDateTime,
    pub backend: Backend,
    pub success: bool,
    pub row_count: i64,
    pub result_csv: String,
    pub query_name: String,
    pub runtime: f64,
    pub result_folder: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct TestResultRow {
    id: i64,
    start_time: NaiveDateTime,
    backend: String,
    success: bool,
    row_count: i64,
    result_csv: String,
    query_name: String,
    runtime: f64,
    result_folder: Option<String>,
}

impl TryFrom<TestResultRow> for TestResult {
    type Error = RunnerError;

    fn try_from(row: TestResultRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            start_time: row.start_time,
            backend: super::stored_backend(&row.backend)?,
            success: row.success,
            row_count: row.row_count,
            result_csv: row.result_csv,
            query_name: row.query_name,
            runtime: row.runtime,
            result_folder: row.result_folder,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, start_time, backend, success, row_count, result_csv,
           query_name, runtime, result_folder
    FROM results
"#;

/// Records a result and returns its id.
pub async fn insert(pool: &SqlitePool, result: &NewTestResult) -> Result<i64> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO results
        (start_time, backend, success, row_count, result_csv, query_name, runtime, result_folder)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(result.start_time)
    .bind(result.backend.as_str())
    .bind(result.success)
    .bind(result.row_count)
    .bind(&result.result_csv)
    .bind(&result.query_name)
    .bind(result.runtime)
    .bind(&result.result_folder)
    .execute(pool)
    .await
    .map_err(|e| RunnerError::persistence(format!("Failed to add test result: {e}")))?;

    Ok(inserted.last_insert_rowid())
}

/// Lists stand-alone results, newest first.
pub async fn list_standalone(
    pool: &SqlitePool,
    backend: Option<Backend>,
    result_csv: Option<&str>,
) -> Result<Vec<TestResult>> {
    let mut query = format!("{SELECT_COLUMNS} WHERE result_folder IS NULL");
    if backend.is_some() {
        query.push_str(" AND backend = ?");
    }
    if result_csv.is_some() {
        query.push_str(" AND result_csv = ?");
    }
    query.push_str(" ORDER BY start_time DESC, id DESC");

    let mut sqlx_query = sqlx::query_as::<_, TestResultRow>(&query);
    if let Some(backend) = backend {
        sqlx_query = sqlx_query.bind(backend.as_str());
    }
    if let Some(csv) = result_csv {
        sqlx_query = sqlx_query.bind(csv);
    }

    let rows = sqlx_query
        .fetch_all(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to list test results: {e}")))?;

    rows.into_iter().map(TestResult::try_from).collect()
}

/// Lists results owned by power tests, in execution order.
pub async fn list_owned(
    pool: &SqlitePool,
    test_id: Option<i64>,
    result_folder: Option<&str>,
    backend: Option<Backend>,
) -> Result<Vec<TestResult>> {
    let mut query = format!("{SELECT_COLUMNS} WHERE result_folder IS NOT NULL");
    if test_id.is_some() {
        query.push_str(" AND id = ?");
    }
    if result_folder.is_some() {
        query.push_str(" AND result_folder = ?");
    }
    if backend.is_some() {
        query.push_str(" AND backend = ?");
    }
    query.push_str(" ORDER BY id");

    let mut sqlx_query = sqlx::query_as::<_, TestResultRow>(&query);
    if let Some(id) = test_id {
        sqlx_query = sqlx_query.bind(id);
    }
    if let Some(folder) = result_folder {
        sqlx_query = sqlx_query.bind(folder);
    }
    if let Some(backend) = backend {
        sqlx_query = sqlx_query.bind(backend.as_str());
    }

    let rows = sqlx_query
        .fetch_all(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to list test results: {e}")))?;

    rows.into_iter().map(TestResult::try_from).collect()
}

/// Gets a result by id, owned or not.
pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<TestResult>> {
    let row: Option<TestResultRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to get test result: {e}")))?;

    row.map(TestResult::try_from).transpose()
}

/// Deletes one result row inside a transaction.
pub(super) async fn delete(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM results WHERE id = ?")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to delete test result: {e}")))?;

    Ok(result.rows_affected())
}

/// Deletes every result of a power test inside a transaction.
pub(super) async fn delete_by_folder(
    tx: &mut Transaction<'_, Sqlite>,
    result_folder: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM results WHERE result_folder = ?")
        .bind(result_folder)
        .execute(&mut **tx)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to delete test results: {e}")))?;

    Ok(result.rows_affected())
}
