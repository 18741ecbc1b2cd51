//! Benchmark orchestrator.
//!
//! Drives one backend through schema creation, data loading, index
//! maintenance, single queries and the power test. Every operation acquires
//! the connection with [`scoped`] so it is closed again on all exit paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::artifact::ResultTable;
use crate::config::Paths;
use crate::db::{
    drop_index_statement, scoped, Backend, Connection, ExecStatus, QueryOutcome, IDX_DROP_QUERY,
    IDX_INDEX_QUERY,
};
use crate::error::{Result, RunnerError};
use crate::persistence::{NewTestResult, ResultStore};
use crate::tpch::{is_tpch_table, ALL_TABLES, NUM_QUERIES, QUERY_ORDER};

/// Default field delimiter of generated data files.
pub const DEFAULT_DELIMITER: char = '|';

/// Lifecycle of the benchmark schema on one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    TablesCreated,
    DataLoaded,
    Indexed,
    QueryReady,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::TablesCreated => "tables_created",
            Self::DataLoaded => "data_loaded",
            Self::Indexed => "indexed",
            Self::QueryReady => "query_ready",
        };
        f.write_str(s)
    }
}

/// Bookkeeping of one `run_query` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    pub backend: Backend,
    pub query_file: PathBuf,
    pub started_at: NaiveDateTime,
    /// CSV artifact written for the run, if reporting was on.
    pub result_file: Option<PathBuf>,
    /// Id of the recorded `TestResult`, if reporting was on.
    pub result_id: Option<i64>,
}

/// Outcome of one query execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRun {
    pub index: usize,
    pub success: bool,
    pub outcome: QueryOutcome,
    /// Wall-clock seconds, rounded to 4 decimals.
    pub runtime: f64,
    pub context: QueryContext,
}

/// Per-query line of a power test summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySummary {
    pub index: usize,
    pub success: bool,
    pub row_count: i64,
    pub runtime: f64,
}

/// Result of a full power test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerTestSummary {
    /// `None` when the run was not reported.
    pub result_folder: Option<String>,
    pub started_at: NaiveDateTime,
    pub success: bool,
    pub runtime: f64,
    /// In execution order.
    pub queries: Vec<QuerySummary>,
}

/// Tables loaded and tables that failed during `load_data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<(String, u64)>,
    pub failed: Vec<(String, String)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Orchestrates the benchmark for one backend.
pub struct TpchRunner {
    conn: Box<dyn Connection>,
    backend: Backend,
    scale: String,
    paths: Paths,
    store: ResultStore,
    state: RunnerState,
}

impl TpchRunner {
    pub fn new(conn: Box<dyn Connection>, paths: Paths, store: ResultStore, scale: impl Into<String>) -> Self {
        let backend = conn.backend();
        Self {
            conn,
            backend,
            scale: scale.into(),
            paths,
            store,
            state: RunnerState::Idle,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn scale(&self) -> &str {
        &self.scale
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    fn schema_dir(&self) -> PathBuf {
        self.paths.schema_dir(self.backend)
    }

    /// Runs the backend's schema scripts. Any failure is fatal; drop the
    /// tables and retry.
    pub async fn create_tables(&mut self) -> Result<()> {
        let dir = self.schema_dir();
        let scripts: Vec<PathBuf> = self
            .backend
            .schema_scripts()
            .iter()
            .map(|name| dir.join(name))
            .collect();
        if let Some(missing) = scripts.iter().find(|p| !p.is_file()) {
            return Err(RunnerError::not_found(format!(
                "Schema script {} does not exist",
                missing.display()
            )));
        }

        scoped(self.conn.as_mut(), move |c| {
            Box::pin(async move {
                for script in &scripts {
                    c.execute_script(script).await?;
                    info!(script = %script.display(), "schema script applied");
                }
                c.commit().await?;
                Ok(())
            })
        })
        .await?;

        self.state = RunnerState::TablesCreated;
        info!(backend = %self.backend, "All tables are created");
        Ok(())
    }

    /// Finds the data file of `table` in `folder`: `<table>.csv` when present,
    /// otherwise the first `<table>.*` by name.
    pub fn data_file(folder: &Path, table: &str) -> Result<PathBuf> {
        let entries = std::fs::read_dir(folder).map_err(|e| {
            RunnerError::not_found(format!("Data folder {} unreadable: {e}", folder.display()))
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.file_stem().and_then(|s| s.to_str()) == Some(table)
                    && path.extension().is_some()
            })
            .collect();
        candidates.sort();

        candidates
            .iter()
            .find(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| {
                RunnerError::not_found(format!(
                    "No data file for table {table} in {}",
                    folder.display()
                ))
            })
    }

    /// Loads one table. Failures propagate.
    pub async fn load_single_table(
        &mut self,
        table: &str,
        folder: Option<&Path>,
        delimiter: char,
    ) -> Result<u64> {
        if !is_tpch_table(table) {
            return Err(RunnerError::config(format!("Invalid table name {table}.")));
        }
        let folder = folder.unwrap_or(&self.paths.data_dir);
        let data_file = Self::data_file(folder, table)?;
        let table_name = table.to_string();

        let started = Instant::now();
        let status = scoped(self.conn.as_mut(), move |c| {
            Box::pin(async move {
                let status = c.copy_from(&table_name, &data_file, delimiter).await?;
                c.commit().await?;
                Ok(status)
            })
        })
        .await?;

        match status {
            ExecStatus::Affected(rows) => {
                info!(
                    table,
                    rows,
                    elapsed = %format!("{:.4}", started.elapsed().as_secs_f64()),
                    "table loaded"
                );
                Ok(rows)
            }
            ExecStatus::Closed => Err(RunnerError::connection(format!(
                "Load of {table} skipped: database has been closed"
            ))),
        }
    }

    /// Loads every table, continuing past failures.
    pub async fn load_data(&mut self, folder: Option<&Path>, delimiter: char) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for table in ALL_TABLES {
            match self.load_single_table(table, folder, delimiter).await {
                Ok(rows) => report.loaded.push((table.to_string(), rows)),
                Err(e) => {
                    error!(table, "Load data fails, exception: {e}");
                    report.failed.push((table.to_string(), e.to_string()));
                }
            }
        }

        if report.is_complete() {
            self.state = RunnerState::DataLoaded;
            info!("All tables finish loading.");
        } else {
            warn!(failed = report.failed.len(), "Data load finished with failures");
        }
        Ok(report)
    }

    /// Backend-specific index maintenance after loading.
    ///
    /// MySQL refuses to recreate `IDX%` indexes that already exist unless
    /// `bypass` is set, in which case index creation is skipped.
    pub async fn after_load(&mut self, bypass: bool) -> Result<()> {
        let dir = self.schema_dir();
        let backend = self.backend;

        let done = scoped(self.conn.as_mut(), move |c| {
            Box::pin(async move {
                match backend {
                    Backend::Postgres => {
                        c.execute_script(&dir.join("pg_index.sql")).await?;
                        c.execute("analyze").await?;
                    }
                    Backend::MySql => {
                        let existing = c
                            .fetch(IDX_INDEX_QUERY)
                            .await?
                            .map(|set| set.rows.len())
                            .unwrap_or(0);
                        if existing > 0 {
                            error!("There are IDX indexes exist, remove them first with `db drop-indexes`.");
                            if !bypass {
                                return Ok(false);
                            }
                            warn!("Bypass requested, index creation is skipped.");
                        } else {
                            info!("Create indexes");
                            c.execute_script(&dir.join("mysql_index.sql")).await?;
                            c.commit().await?;
                        }

                        let after = dir.join("after-load.sql");
                        if after.is_file() {
                            info!("Analyze database");
                            c.execute_script(&after).await?;
                        }
                    }
                    Backend::Sqlite => {
                        c.execute("analyze").await?;
                    }
                    Backend::DuckDb => {}
                }
                c.commit().await?;
                Ok(true)
            })
        })
        .await?;

        if done {
            self.state = RunnerState::Indexed;
        }
        Ok(())
    }

    /// Drops every `IDX%` secondary index (MySQL only) and returns how many
    /// were dropped. Primary keys are kept.
    pub async fn drop_indexes(&mut self) -> Result<usize> {
        if self.backend != Backend::MySql {
            return Err(RunnerError::config(format!(
                "Dropping IDX indexes is only supported on mysql, not {}.",
                self.backend
            )));
        }

        let dropped = scoped(self.conn.as_mut(), |c| {
            Box::pin(async move {
                info!("Check if there is any indexes exist.");
                let statements: Vec<String> = c
                    .fetch(IDX_DROP_QUERY)
                    .await?
                    .map(|set| set.rows)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|row| match row.as_slice() {
                        [index, table] => Some(drop_index_statement(
                            &index.to_csv_field(),
                            &table.to_csv_field(),
                        )),
                        _ => None,
                    })
                    .collect();
                for stmt in &statements {
                    c.execute(stmt).await?;
                }
                c.commit().await?;
                Ok(statements.len())
            })
        })
        .await?;

        info!("All IDX indexes are dropped ({dropped}).");
        Ok(dropped)
    }

    /// Empties one table, or every table for `"all"`. Never raises.
    pub async fn truncate_table(&mut self, table: &str) -> bool {
        let statements = self.per_table_statements(table, |t| self.backend.truncate_statement(t));
        let ok = self.run_best_effort("Truncate", statements).await;
        if ok {
            info!("Table {table} is truncated.");
        }
        ok
    }

    /// Drops one table, or every table for `"all"`. Never raises.
    pub async fn drop_table(&mut self, table: &str) -> bool {
        let statements = self.per_table_statements(table, |t| self.backend.drop_statement(t));
        let ok = self.run_best_effort("Drop", statements).await;
        if ok {
            if table == "all" {
                self.state = RunnerState::Idle;
            }
            info!("Table {table} are dropped.");
        }
        ok
    }

    fn per_table_statements(&self, table: &str, make: impl Fn(&str) -> String) -> Vec<String> {
        if table == "all" {
            ALL_TABLES.iter().rev().map(|t| make(t)).collect()
        } else {
            vec![make(table)]
        }
    }

    async fn run_best_effort(&mut self, action: &'static str, statements: Vec<String>) -> bool {
        let outcome = scoped(self.conn.as_mut(), move |c| {
            Box::pin(async move {
                let mut ok = true;
                for stmt in &statements {
                    match c.execute(stmt).await {
                        Ok(ExecStatus::Affected(_)) => {}
                        Ok(ExecStatus::Closed) => {
                            warn!("{action} skipped, database has been closed: {stmt}");
                            ok = false;
                        }
                        Err(e) => {
                            error!("{action} table fails, exception: {e}.");
                            ok = false;
                        }
                    }
                }
                if !c.commit().await? {
                    ok = false;
                }
                Ok(ok)
            })
        })
        .await;

        match outcome {
            Ok(ok) => ok,
            Err(e) => {
                error!("{action} table fails, exception: {e}.");
                false
            }
        }
    }

    /// Query text for `index`: `<schema>/queries/q<n>.sql` overrides the
    /// shared `<queries>/q<n>.sql`.
    pub fn query_file(&self, index: usize) -> PathBuf {
        let name = format!("q{index}.sql");
        let custom = self.schema_dir().join("queries").join(&name);
        if custom.is_file() {
            custom
        } else {
            self.paths.query_dir().join(name)
        }
    }

    /// Runs one query and, unless `no_report`, writes its CSV artifact and
    /// records a `TestResult`.
    ///
    /// With `result_dir` the artifact is `<result_dir>/<n>.csv` and the
    /// record belongs to the power test named by the directory; otherwise it
    /// is a stand-alone `<backend>_q<n>_<timestamp>.csv`. A failing query is
    /// logged and reported with `success == false` and a row count of -1;
    /// only recording errors propagate.
    pub async fn run_query(
        &mut self,
        index: usize,
        result_dir: Option<&Path>,
        no_report: bool,
    ) -> Result<QueryRun> {
        if !(1..=NUM_QUERIES).contains(&index) {
            return Err(RunnerError::config(format!(
                "Query index must be between 1 and {NUM_QUERIES}, got {index}"
            )));
        }

        let query_file = self.query_file(index);
        let started_at = Local::now().naive_local();
        let file = query_file.clone();

        let started = Instant::now();
        let executed = scoped(self.conn.as_mut(), move |c| {
            Box::pin(async move { c.execute_script(&file).await })
        })
        .await;
        let runtime = round4(started.elapsed().as_secs_f64());

        let (success, outcome) = match executed {
            Ok(outcome) => {
                info!("Q{index} succeeds, return {} rows.", outcome.row_count);
                self.state = RunnerState::QueryReady;
                (true, outcome)
            }
            Err(e) => {
                error!("Query execution fails, exception: {e}");
                (false, QueryOutcome::failed())
            }
        };

        let mut context = QueryContext {
            backend: self.backend,
            query_file,
            started_at,
            result_file: None,
            result_id: None,
        };

        if !no_report {
            let (csv_name, csv_path, folder) = match result_dir {
                Some(dir) => {
                    let name = format!("{index}.csv");
                    let folder = dir
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(String::from)
                        .ok_or_else(|| {
                            RunnerError::config(format!("Invalid result folder {}", dir.display()))
                        })?;
                    (name.clone(), dir.join(name), Some(folder))
                }
                None => {
                    let name = format!(
                        "{}_q{index}_{}.csv",
                        self.backend,
                        started_at.format("%Y-%m-%d-%H%M%S")
                    );
                    (name.clone(), self.paths.result_dir.join(name), None)
                }
            };

            ResultTable::from_outcome(&outcome).write(&csv_path)?;
            let id = self
                .store
                .add_test_result(&NewTestResult {
                    start_time: started_at,
                    backend: self.backend,
                    success,
                    row_count: outcome.row_count,
                    result_csv: csv_name,
                    query_name: index.to_string(),
                    runtime,
                    result_folder: folder,
                })
                .await?;
            context.result_file = Some(csv_path);
            context.result_id = Some(id);
        }

        Ok(QueryRun {
            index,
            success,
            outcome,
            runtime,
            context,
        })
    }

    /// Runs all queries in stream 0 order.
    ///
    /// The run succeeds only if every query succeeds; all queries execute
    /// regardless. With `no_report` nothing is persisted.
    pub async fn power_test(&mut self, no_report: bool) -> Result<PowerTestSummary> {
        let started_at = Local::now().naive_local();

        let result_folder = if no_report {
            None
        } else {
            let folder = self
                .store
                .allocate_result_folder(self.backend, started_at)
                .await?;
            self.store
                .add_powertest(started_at, &folder, self.backend, &self.scale)
                .await?;
            Some(folder)
        };
        let result_dir = result_folder.as_ref().map(|f| self.paths.result_dir.join(f));
        if let Some(dir) = &result_dir {
            std::fs::create_dir_all(dir)?;
            info!("Test result will be saved in: {}", dir.display());
        }
        info!(
            "Power test start at {}",
            started_at.format("%Y-%m-%d %H:%M:%S")
        );

        let mut queries = Vec::with_capacity(NUM_QUERIES);
        let mut success = true;
        let mut runtime = 0.0;
        for &index in &QUERY_ORDER[0] {
            let run = match self.run_query(index, result_dir.as_deref(), no_report).await {
                Ok(run) => run,
                Err(e) => {
                    error!("Power test aborted at Q{index}, exception: {e}");
                    if let Some(folder) = &result_folder {
                        if let Err(update) = self.store.update_powertest(folder, false, runtime).await {
                            error!("Cannot mark power test {folder} as failed: {update}");
                        }
                    }
                    return Err(e);
                }
            };
            success &= run.success;
            runtime += run.runtime;
            queries.push(QuerySummary {
                index,
                success: run.success,
                row_count: run.outcome.row_count,
                runtime: run.runtime,
            });
        }

        if let Some(folder) = &result_folder {
            self.store.update_powertest(folder, success, runtime).await?;
        }

        info!(
            "Powertest is finished, test result: {}, total time: {:.6} secs.",
            if success { "Succeed" } else { "Fail" },
            runtime
        );

        Ok(PowerTestSummary {
            result_folder,
            started_at,
            success,
            runtime,
            queries,
        })
    }
}

fn round4(secs: f64) -> f64 {
    (secs * 10_000.0).round() / 10_000.0
}
