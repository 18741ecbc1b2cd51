//! Power test records.
//!
//! One row per benchmark run; per-query results hang off `result_folder`.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::{FromRow, Transaction};

use crate::db::Backend;
use crate::error::{Result, RunnerError};

/// A persisted power test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerTest {
    pub id: i64,
    pub backend: Backend,
    pub scale: String,
    pub result_folder: String,
    pub start_time: NaiveDateTime,
    /// `None` until the run finishes.
    pub success: Option<bool>,
    /// Total seconds; `None` until the run finishes.
    pub runtime: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
struct PowerTestRow {
    id: i64,
    backend: String,
    scale: String,
    result_folder: String,
    start_time: NaiveDateTime,
    success: Option<bool>,
    runtime: Option<f64>,
}

impl TryFrom<PowerTestRow> for PowerTest {
    type Error = RunnerError;

    fn try_from(row: PowerTestRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            backend: super::stored_backend(&row.backend)?,
            scale: row.scale,
            result_folder: row.result_folder,
            start_time: row.start_time,
            success: row.success,
            runtime: row.runtime,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, backend, scale, result_folder, start_time, success, runtime FROM powertests";

/// Inserts a new, unfinished power test and returns its id.
pub async fn insert(
    pool: &SqlitePool,
    start_time: NaiveDateTime,
    result_folder: &str,
    backend: Backend,
    scale: &str,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO powertests (backend, scale, result_folder, start_time)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(backend.as_str())
    .bind(scale)
    .bind(result_folder)
    .bind(start_time)
    .execute(pool)
    .await
    .map_err(|e| RunnerError::persistence(format!("Failed to add power test: {e}")))?;

    Ok(result.last_insert_rowid())
}

/// Records the outcome of a finished run.
pub async fn update(
    pool: &SqlitePool,
    result_folder: &str,
    success: bool,
    runtime: f64,
) -> Result<()> {
    let result = sqlx::query("UPDATE powertests SET success = ?, runtime = ? WHERE result_folder = ?")
        .bind(success)
        .bind(runtime)
        .bind(result_folder)
        .execute(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to update power test: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(RunnerError::not_found(format!(
            "PowerTest {result_folder} not found."
        )));
    }
    Ok(())
}

/// Lists power tests, newest first. Both filters absent returns everything.
pub async fn list(
    pool: &SqlitePool,
    backend: Option<Backend>,
    result_folder: Option<&str>,
) -> Result<Vec<PowerTest>> {
    let mut query = format!("{SELECT_COLUMNS} WHERE 1=1");
    if backend.is_some() {
        query.push_str(" AND backend = ?");
    }
    if result_folder.is_some() {
        query.push_str(" AND result_folder = ?");
    }
    query.push_str(" ORDER BY start_time DESC, id DESC");

    let mut sqlx_query = sqlx::query_as::<_, PowerTestRow>(&query);
    if let Some(backend) = backend {
        sqlx_query = sqlx_query.bind(backend.as_str());
    }
    if let Some(folder) = result_folder {
        sqlx_query = sqlx_query.bind(folder);
    }

    let rows = sqlx_query
        .fetch_all(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to list power tests: {e}")))?;

    rows.into_iter().map(PowerTest::try_from).collect()
}

/// Gets a power test by id.
pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<PowerTest>> {
    let row: Option<PowerTestRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to get power test: {e}")))?;

    row.map(PowerTest::try_from).transpose()
}

/// Returns true if a power test already uses `result_folder`.
pub async fn folder_exists(pool: &SqlitePool, result_folder: &str) -> Result<bool> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM powertests WHERE result_folder = ?")
            .bind(result_folder)
            .fetch_one(pool)
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to check folder: {e}")))?;

    Ok(count > 0)
}

/// Resolves the folder of power test `id` inside a transaction.
pub(super) async fn folder_of(tx: &mut Transaction<'_, Sqlite>, id: i64) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT result_folder FROM powertests WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to get power test: {e}")))?;

    Ok(row.map(|(folder,)| folder))
}

/// Deletes the power test row for `result_folder`, returning rows removed.
pub(super) async fn delete_by_folder(
    tx: &mut Transaction<'_, Sqlite>,
    result_folder: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM powertests WHERE result_folder = ?")
        .bind(result_folder)
        .execute(&mut **tx)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to delete power test: {e}")))?;

    Ok(result.rows_affected())
}
