//! Result store for tpch-runner.
//!
//! Keeps the history of power tests and per-query results in a local SQLite
//! file, alongside the CSV artifacts under the result directory.

mod migrations;
mod powertests;
mod results;

pub use powertests::PowerTest;
pub use results::{NewTestResult, TestResult};

use crate::artifact::ResultTable;
use crate::compare::{AnswerComparator, ComparisonContext};
use crate::db::Backend;
use crate::error::{Result, RunnerError};
use crate::tpch::NUM_QUERIES;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Runtime breakdown of one power test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerTestRuntime {
    pub backend: Backend,
    pub result_folder: String,
    pub total: f64,
    /// Seconds per query, indexed by query number minus one; 0.0 when absent.
    pub per_query: Vec<f64>,
}

/// Two power tests side by side, with their results paired by query number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerTestComparison {
    pub source: PowerTest,
    pub dest: PowerTest,
    pub queries: Vec<QueryPair>,
}

/// Results of one query in two power tests; `None` where a run has no record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPair {
    pub index: usize,
    pub source: Option<TestResult>,
    pub dest: Option<TestResult>,
}

/// Parses a backend tag read back from the store.
pub(super) fn stored_backend(tag: &str) -> Result<Backend> {
    Backend::parse(tag)
        .ok_or_else(|| RunnerError::persistence(format!("Unknown backend '{tag}' in result store")))
}

/// Durable history of power tests and query results.
#[derive(Debug, Clone)]
pub struct ResultStore {
    pool: SqlitePool,
    db_path: PathBuf,
    result_dir: PathBuf,
}

impl ResultStore {
    /// Opens or creates the store at `db_path`; artifacts live under `result_dir`.
    pub async fn open(db_path: &Path, result_dir: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(db_path)?;

        match Self::try_open(db_path, result_dir).await {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!("Failed to open result store: {e}. Attempting recovery...");
                Self::attempt_recovery(db_path, result_dir).await
            }
        }
    }

    /// Attempts to open the database with retries for lock contention.
    async fn try_open(db_path: &Path, result_dir: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt))).await;
            }

            match Self::connect(db_path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Result store opened at {}", db_path.display());
                    return Ok(Self {
                        pool,
                        db_path: db_path.to_path_buf(),
                        result_dir: result_dir.to_path_buf(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| RunnerError::persistence("Failed to open database after retries")))
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| RunnerError::persistence(format!("Invalid database path: {e}")))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to connect to result store: {e}")))
    }

    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RunnerError::persistence(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Moves a corrupted database aside and starts a fresh one.
    async fn attempt_recovery(db_path: &Path, result_dir: &Path) -> Result<Self> {
        let backup_path = db_path.with_extension("db.bak");

        if db_path.exists() {
            std::fs::rename(db_path, &backup_path).map_err(|e| {
                RunnerError::persistence(format!(
                    "Failed to backup corrupted database to {}: {e}",
                    backup_path.display()
                ))
            })?;
            warn!("Backed up corrupted database to {}", backup_path.display());
        }

        Self::try_open(db_path, result_dir).await.map_err(|e| {
            RunnerError::persistence(format!("Failed to recreate database after backup: {e}"))
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Picks an unused folder name `<backend>_<YYYYmmdd_HHMMSS>`.
    pub async fn allocate_result_folder(
        &self,
        backend: Backend,
        start_time: NaiveDateTime,
    ) -> Result<String> {
        let base = format!("{}_{}", backend.as_str(), start_time.format("%Y%m%d_%H%M%S"));
        let mut candidate = base.clone();
        let mut suffix = 1;
        while powertests::folder_exists(&self.pool, &candidate).await?
            || self.result_dir.join(&candidate).exists()
        {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        Ok(candidate)
    }

    pub async fn add_powertest(
        &self,
        start_time: NaiveDateTime,
        result_folder: &str,
        backend: Backend,
        scale: &str,
    ) -> Result<i64> {
        powertests::insert(&self.pool, start_time, result_folder, backend, scale).await
    }

    /// Records the outcome of a finished run; `NotFound` for an unknown folder.
    pub async fn update_powertest(&self, result_folder: &str, success: bool, runtime: f64) -> Result<()> {
        powertests::update(&self.pool, result_folder, success, runtime).await
    }

    pub async fn get_powertests(
        &self,
        backend: Option<Backend>,
        result_folder: Option<&str>,
    ) -> Result<Vec<PowerTest>> {
        powertests::list(&self.pool, backend, result_folder).await
    }

    /// Gets a power test by id, failing with `NotFound` when absent.
    pub async fn get_powertest(&self, id: i64) -> Result<PowerTest> {
        powertests::get(&self.pool, id)
            .await?
            .ok_or_else(|| RunnerError::not_found(format!("PowerTest {id} not found.")))
    }

    /// Deletes a power test, its results, and its artifact directory as one unit.
    ///
    /// The row deletions commit only after the directory is gone; if removing
    /// the directory fails the transaction rolls back.
    pub async fn delete_powertest(&self, id: Option<i64>, result_folder: Option<&str>) -> Result<String> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to begin transaction: {e}")))?;

        let folder = match (id, result_folder) {
            (Some(id), _) => powertests::folder_of(&mut tx, id)
                .await?
                .ok_or_else(|| RunnerError::not_found(format!("PowerTest {id} not found.")))?,
            (None, Some(folder)) => folder.to_string(),
            (None, None) => {
                return Err(RunnerError::config(
                    "Either a power test id or a result folder is required",
                ))
            }
        };

        let removed_results = results::delete_by_folder(&mut tx, &folder).await?;
        if powertests::delete_by_folder(&mut tx, &folder).await? == 0 {
            return Err(RunnerError::not_found(format!("PowerTest {folder} not found.")));
        }

        let dir = self.result_dir.join(&folder);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }

        tx.commit()
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to commit deletion: {e}")))?;

        info!(folder, removed_results, "Power test deleted");
        Ok(folder)
    }

    pub async fn add_test_result(&self, result: &NewTestResult) -> Result<i64> {
        results::insert(&self.pool, result).await
    }

    /// Stand-alone results only.
    pub async fn get_test_results(
        &self,
        backend: Option<Backend>,
        result_csv: Option<&str>,
    ) -> Result<Vec<TestResult>> {
        results::list_standalone(&self.pool, backend, result_csv).await
    }

    pub async fn get_test_result(&self, id: i64) -> Result<TestResult> {
        results::get(&self.pool, id)
            .await?
            .ok_or_else(|| RunnerError::not_found(format!("TestResult {id} not found.")))
    }

    /// Results owned by power tests. `test_id` is a result id.
    pub async fn get_test_results_from_powertest(
        &self,
        test_id: Option<i64>,
        result_folder: Option<&str>,
        backend: Option<Backend>,
    ) -> Result<Vec<TestResult>> {
        results::list_owned(&self.pool, test_id, result_folder, backend).await
    }

    /// Deletes a stand-alone result and its CSV artifact.
    pub async fn delete_test_result(&self, id: i64) -> Result<()> {
        let result = self.get_test_result(id).await?;
        if let Some(folder) = &result.result_folder {
            return Err(RunnerError::ownership(format!(
                "TestResult {id} belongs to power test {folder}, please delete the power test instead."
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to begin transaction: {e}")))?;
        results::delete(&mut tx, id).await?;

        let file = self.artifact_path(&result);
        if file.exists() {
            std::fs::remove_file(&file)?;
        }

        tx.commit()
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to commit deletion: {e}")))?;
        info!(id, file = %file.display(), "Test result deleted");
        Ok(())
    }

    /// Location of a result's CSV artifact.
    pub fn artifact_path(&self, result: &TestResult) -> PathBuf {
        match &result.result_folder {
            Some(folder) => self.result_dir.join(folder).join(&result.result_csv),
            None => self.result_dir.join(&result.result_csv),
        }
    }

    /// Loads a result together with its parsed CSV artifact.
    pub async fn read_result(&self, id: i64) -> Result<(TestResult, ResultTable)> {
        let result = self.get_test_result(id).await?;
        let table = ResultTable::read(&self.artifact_path(&result))?;
        Ok((result, table))
    }

    pub async fn get_powertest_runtime(&self, id: i64) -> Result<PowerTestRuntime> {
        let test = self.get_powertest(id).await?;
        let owned =
            results::list_owned(&self.pool, None, Some(&test.result_folder), None).await?;

        let mut per_query = vec![0.0; NUM_QUERIES];
        for result in &owned {
            if let Some(slot) = result
                .query_index()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| per_query.get_mut(i))
            {
                *slot = result.runtime;
            }
        }

        let total = test.runtime.unwrap_or_else(|| per_query.iter().sum());
        Ok(PowerTestRuntime {
            backend: test.backend,
            result_folder: test.result_folder,
            total,
            per_query,
        })
    }

    /// Puts two power tests and their per-query results side by side.
    pub async fn compare_powertests(&self, source: i64, dest: i64) -> Result<PowerTestComparison> {
        let source = self.get_powertest(source).await?;
        let dest = self.get_powertest(dest).await?;
        let source_results =
            results::list_owned(&self.pool, None, Some(&source.result_folder), None).await?;
        let dest_results =
            results::list_owned(&self.pool, None, Some(&dest.result_folder), None).await?;

        let find = |owned: &[TestResult], n: usize| {
            owned.iter().find(|r| r.query_index() == Some(n)).cloned()
        };
        let queries = (1..=NUM_QUERIES)
            .map(|n| QueryPair {
                index: n,
                source: find(source_results.as_slice(), n),
                dest: find(dest_results.as_slice(), n),
            })
            .filter(|pair| pair.source.is_some() || pair.dest.is_some())
            .collect();

        Ok(PowerTestComparison {
            source,
            dest,
            queries,
        })
    }

    /// Fetches two results for a side-by-side view.
    pub async fn compare_results(&self, source: i64, dest: i64) -> Result<(TestResult, TestResult)> {
        Ok((self.get_test_result(source).await?, self.get_test_result(dest).await?))
    }

    /// Validates every per-query artifact of a power test against the answers.
    ///
    /// A mismatch is logged and counted; an error from the comparator (missing
    /// artifact or answer) aborts the whole validation.
    pub async fn compare_powertest(
        &self,
        id: i64,
        comparator: &dyn AnswerComparator,
    ) -> Result<(bool, String)> {
        let test = self.get_powertest(id).await?;
        let context = ComparisonContext {
            backend: test.backend,
            result_folder: Some(test.result_folder.clone()),
            scale: test.scale.clone(),
        };

        let mut all_pass = true;
        for n in 1..=comparator.answer_queries() {
            if !comparator.compare(&context, &format!("{n}.csv"))? {
                error!("Query {n} result is not matched against answer. Test failed.");
                all_pass = false;
            }
        }

        Ok((all_pass, test.result_folder))
    }
}
