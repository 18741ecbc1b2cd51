//! Schema versioning and migrations for the result store.
//!
//! Manages database schema evolution with forward-only migrations.

use crate::error::{Result, RunnerError};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(RunnerError::persistence(format!(
            "Database schema version ({}) is newer than supported version ({}). \
             Please upgrade tpch-runner to the latest version.",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating result store from version {} to {}",
            current, CURRENT_VERSION
        );
        run_pending_migrations(pool, current).await?;
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        RunnerError::persistence(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn run_pending_migrations(pool: &SqlitePool, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=CURRENT_VERSION {
        run_migration(pool, version).await?;
        record_version(pool, version).await?;
        info!("Applied migration v{}", version);
    }
    Ok(())
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(RunnerError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: power tests and per-query results.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS powertests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            backend TEXT NOT NULL,
            scale TEXT NOT NULL,
            result_folder TEXT NOT NULL UNIQUE,
            start_time TEXT NOT NULL,
            success INTEGER,
            runtime REAL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RunnerError::persistence(format!("Failed to create powertests table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            start_time TEXT NOT NULL,
            backend TEXT NOT NULL,
            success INTEGER NOT NULL,
            row_count INTEGER NOT NULL,
            result_csv TEXT NOT NULL,
            query_name TEXT NOT NULL,
            runtime REAL NOT NULL DEFAULT 0,
            result_folder TEXT REFERENCES powertests(result_folder) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RunnerError::persistence(format!("Failed to create results table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_folder ON results(result_folder)")
        .execute(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to create index: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_powertests_backend ON powertests(backend)")
        .execute(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to create index: {e}")))?;

    Ok(())
}
