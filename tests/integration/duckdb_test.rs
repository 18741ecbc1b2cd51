//! DuckDB backend through the orchestrator. Built with `--features duckdb`.

use tpch_runner::config::ConnectionConfig;
use tpch_runner::db::{self, Backend};
use tpch_runner::tpch::{RunnerState, TpchRunner};

use super::common::{workspace, Workspace, TABLE_SCHEMA};

async fn duckdb_runner(ws: &Workspace) -> TpchRunner {
    let schema_dir = ws.paths.schema_dir(Backend::DuckDb);
    std::fs::create_dir_all(&schema_dir).unwrap();
    std::fs::write(schema_dir.join("table_schema.sql"), TABLE_SCHEMA).unwrap();

    let config = ConnectionConfig {
        backend: Backend::DuckDb,
        database: Some(ws.root().join("tpch.duckdb").to_string_lossy().into_owned()),
        ..Default::default()
    };
    TpchRunner::new(db::connect(&config).unwrap(), ws.paths.clone(), ws.store().await, "small")
}

#[tokio::test]
async fn test_native_copy_loads_dbgen_files() {
    let ws = workspace();
    let mut runner = duckdb_runner(&ws).await;
    runner.create_tables().await.unwrap();

    let report = runner.load_data(None, '|').await.unwrap();
    assert!(report.is_complete(), "{:?}", report.failed);
    assert_eq!(runner.state(), RunnerState::DataLoaded);
    let counts: Vec<(&str, u64)> = report.loaded.iter().map(|(t, n)| (t.as_str(), *n)).collect();
    assert!(counts.contains(&("nation", 5)));
    assert!(counts.contains(&("lineitem", 3)));

    runner.after_load(false).await.unwrap();
    assert_eq!(runner.state(), RunnerState::Indexed);
}

#[tokio::test]
async fn test_view_query_returns_select_rows() {
    let ws = workspace();
    let mut runner = duckdb_runner(&ws).await;
    runner.create_tables().await.unwrap();
    runner.load_data(None, '|').await.unwrap();

    let run = runner.run_query(15, None, true).await.unwrap();
    assert!(run.success);
    assert_eq!(run.outcome.row_count, 2);
    assert_eq!(
        run.outcome.columns,
        Some(vec!["supplier_no".to_string(), "total_revenue".to_string()])
    );

    let run = runner.run_query(4, None, true).await.unwrap();
    assert_eq!(run.outcome.row_count, 4);
}
