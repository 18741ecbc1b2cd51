//! End-to-end orchestrator tests against a SQLite file.

use pretty_assertions::assert_eq;
use tpch_runner::artifact::ResultTable;
use tpch_runner::error::RunnerError;
use tpch_runner::tpch::{RunnerState, QUERY_ORDER};

use super::common::workspace;

#[tokio::test]
async fn test_lifecycle_states() {
    let ws = workspace();
    let mut runner = ws.runner().await;
    assert_eq!(runner.state(), RunnerState::Idle);

    runner.create_tables().await.unwrap();
    assert_eq!(runner.state(), RunnerState::TablesCreated);

    let report = runner.load_data(None, '|').await.unwrap();
    assert!(report.is_complete());
    assert_eq!(runner.state(), RunnerState::DataLoaded);
    let nation = report.loaded.iter().find(|(t, _)| t == "nation").unwrap();
    assert_eq!(nation.1, 5);

    runner.after_load(false).await.unwrap();
    assert_eq!(runner.state(), RunnerState::Indexed);

    let run = runner.run_query(3, None, true).await.unwrap();
    assert!(run.success);
    assert_eq!(runner.state(), RunnerState::QueryReady);

    assert!(runner.drop_table("all").await);
    assert_eq!(runner.state(), RunnerState::Idle);
}

#[tokio::test]
async fn test_create_tables_twice_is_fatal() {
    let ws = workspace();
    let mut runner = ws.runner().await;
    runner.create_tables().await.unwrap();

    let err = runner.create_tables().await.unwrap_err();
    assert!(matches!(err, RunnerError::Statement { .. }));
    assert!(err.to_string().contains("create table region"));
}

#[tokio::test]
async fn test_create_tables_without_schema_script() {
    let ws = workspace();
    std::fs::remove_file(ws.paths.schema_dir(tpch_runner::db::Backend::Sqlite).join("table_schema.sql"))
        .unwrap();
    let mut runner = ws.runner().await;

    let err = runner.create_tables().await.unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));
}

#[tokio::test]
async fn test_load_continues_past_missing_table() {
    let ws = workspace();
    std::fs::remove_file(ws.data_dir().join("lineitem.tbl")).unwrap();
    let mut runner = ws.runner().await;
    runner.create_tables().await.unwrap();

    let report = runner.load_data(None, '|').await.unwrap();
    assert_eq!(report.loaded.len(), 7);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "lineitem");
    assert_eq!(runner.state(), RunnerState::TablesCreated);

    let err = runner
        .load_single_table("lineitem", None, '|')
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));

    let err = runner.load_single_table("lineitems", None, '|').await.unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));
}

#[tokio::test]
async fn test_standalone_query_is_recorded() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;

    let run = runner.run_query(3, None, false).await.unwrap();
    assert!(run.success);
    assert_eq!(run.outcome.row_count, 3);
    assert_eq!(
        run.outcome.columns,
        Some(vec!["n_nationkey".to_string(), "n_name".to_string()])
    );

    let file = run.context.result_file.clone().unwrap();
    let name = file.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("sqlite_q3_"), "{name}");
    assert_eq!(file.parent().unwrap(), ws.paths.result_dir.as_path());

    let table = ResultTable::read(&file).unwrap();
    assert_eq!(table.headers, vec!["n_nationkey", "n_name"]);
    assert_eq!(table.rows[2], vec!["2".to_string(), "BRAZIL".to_string()]);

    let results = runner.store().get_test_results(None, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result_csv, name);
    assert_eq!(results[0].query_name, "3");
    assert_eq!(results[0].row_count, 3);
    assert_eq!(Some(results[0].id), run.context.result_id);
    assert_eq!(results[0].result_folder, None);
}

#[tokio::test]
async fn test_no_report_writes_nothing() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    ws.override_query(4, "select * from no_such_table;");

    let ok = runner.run_query(2, None, true).await.unwrap();
    let failed = runner.run_query(4, None, true).await.unwrap();
    assert!(ok.success);
    assert!(!failed.success);
    assert!(ok.context.result_file.is_none());

    assert!(runner.store().get_test_results(None, None).await.unwrap().is_empty());
    let artifacts = std::fs::read_dir(&ws.paths.result_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(artifacts, 0);
}

#[tokio::test]
async fn test_failed_query_reports_minus_one() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    ws.override_query(9, "select missing_column from nation;");

    let run = runner.run_query(9, None, false).await.unwrap();
    assert!(!run.success);
    assert_eq!(run.outcome.row_count, -1);
    assert!(run.outcome.rows.is_none());

    let results = runner.store().get_test_results(None, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].row_count, -1);
}

#[tokio::test]
async fn test_query_index_out_of_range() {
    let ws = workspace();
    let mut runner = ws.runner().await;
    let err = runner.run_query(23, None, true).await.unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));
}

#[tokio::test]
async fn test_view_query_keeps_its_rows() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;

    let run = runner.run_query(15, None, true).await.unwrap();
    assert!(run.success);
    assert_eq!(run.outcome.row_count, 2);
    assert_eq!(
        run.outcome.columns,
        Some(vec!["supplier_no".to_string(), "total_revenue".to_string()])
    );

    // the view is gone again, so the query can run twice
    assert!(runner.run_query(15, None, true).await.unwrap().success);
}

#[tokio::test]
async fn test_power_test_success() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;

    let summary = runner.power_test(false).await.unwrap();
    assert!(summary.success);
    let order: Vec<usize> = summary.queries.iter().map(|q| q.index).collect();
    assert_eq!(order, QUERY_ORDER[0].to_vec());

    let expected_runtime: f64 = summary.queries.iter().map(|q| q.runtime).sum();
    assert!((summary.runtime - expected_runtime).abs() < 1e-9);

    let folder = summary.result_folder.clone().unwrap();
    assert!(folder.starts_with("sqlite_"));

    let store = runner.store();
    let tests = store.get_powertests(None, Some(&folder)).await.unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].success, Some(true));
    assert_eq!(tests[0].scale, "small");
    assert!((tests[0].runtime.unwrap() - expected_runtime).abs() < 1e-9);

    let results = store
        .get_test_results_from_powertest(None, Some(&folder), None)
        .await
        .unwrap();
    assert_eq!(results.len(), 22);
    let recorded: f64 = results.iter().map(|r| r.runtime).sum();
    assert!((recorded - tests[0].runtime.unwrap()).abs() < 1e-9);
    let recorded_order: Vec<String> = results.iter().map(|r| r.query_name.clone()).collect();
    assert_eq!(
        recorded_order,
        QUERY_ORDER[0].iter().map(|q| q.to_string()).collect::<Vec<_>>()
    );

    for n in 1..=22 {
        assert!(ws.paths.result_dir.join(&folder).join(format!("{n}.csv")).is_file());
    }
    assert!(store.get_test_results(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_power_test_with_one_failing_query() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    ws.override_query(5, "select * from nation_typo;");

    let summary = runner.power_test(false).await.unwrap();
    assert!(!summary.success);
    assert_eq!(summary.queries.len(), 22);
    let failed: Vec<usize> = summary
        .queries
        .iter()
        .filter(|q| !q.success)
        .map(|q| q.index)
        .collect();
    assert_eq!(failed, vec![5]);

    let folder = summary.result_folder.unwrap();
    let store = runner.store();
    let tests = store.get_powertests(None, Some(&folder)).await.unwrap();
    assert_eq!(tests[0].success, Some(false));

    let results = store
        .get_test_results_from_powertest(None, Some(&folder), None)
        .await
        .unwrap();
    assert_eq!(results.len(), 22);
    let q5 = results.iter().find(|r| r.query_name == "5").unwrap();
    assert!(!q5.success);
    assert_eq!(q5.row_count, -1);
}

#[tokio::test]
async fn test_power_test_without_report() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;

    let summary = runner.power_test(true).await.unwrap();
    assert!(summary.success);
    assert!(summary.result_folder.is_none());
    assert_eq!(summary.queries.len(), 22);

    let store = runner.store();
    assert!(store.get_powertests(None, None).await.unwrap().is_empty());
    assert!(store
        .get_test_results_from_powertest(None, None, None)
        .await
        .unwrap()
        .is_empty());
    assert!(!ws.paths.result_dir.exists() || std::fs::read_dir(&ws.paths.result_dir).unwrap().count() == 0);
}

#[tokio::test]
async fn test_truncate_and_drop_are_best_effort() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;

    assert!(runner.truncate_table("nation").await);
    let run = runner.run_query(22, None, true).await.unwrap();
    assert_eq!(run.outcome.row_count, 0);

    assert!(runner.truncate_table("all").await);
    assert!(!runner.truncate_table("no_such_table").await);

    assert!(runner.drop_table("all").await);
    let run = runner.run_query(22, None, true).await.unwrap();
    assert!(!run.success);

    // tables are gone; truncating now fails without raising
    assert!(!runner.truncate_table("all").await);
    assert!(runner.drop_table("all").await);
}

#[tokio::test]
async fn test_power_test_aborted_by_store_is_closed_as_failed() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;

    // a second handle on the store makes every result insert fail
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&ws.paths.state_db)
        .busy_timeout(std::time::Duration::from_secs(5));
    let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_results BEFORE INSERT ON results \
         BEGIN SELECT RAISE(ABORT, 'disk quota exceeded'); END",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let err = runner.power_test(false).await.unwrap_err();
    assert!(matches!(err, RunnerError::Persistence(_)));

    let tests = runner.store().get_powertests(None, None).await.unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].success, Some(false));
    assert!(tests[0].runtime.is_some());
}
