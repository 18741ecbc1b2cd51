//! Result store tests through the public API.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tpch_runner::db::Backend;
use tpch_runner::error::RunnerError;
use tpch_runner::persistence::{NewTestResult, ResultStore};

use super::common::workspace;

#[tokio::test]
async fn test_add_then_update_powertest() {
    let ws = workspace();
    let store = ws.store().await;
    let start = NaiveDate::from_ymd_opt(2025, 1, 12)
        .unwrap()
        .and_hms_opt(22, 56, 9)
        .unwrap();

    store
        .add_powertest(start, "run1", Backend::MySql, "small")
        .await
        .unwrap();
    let found = store.get_powertests(None, Some("run1")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].backend, Backend::MySql);
    assert_eq!(found[0].success, None);
    assert_eq!(found[0].runtime, None);

    store.update_powertest("run1", true, 12.34).await.unwrap();
    let found = store.get_powertests(None, Some("run1")).await.unwrap();
    assert_eq!(found[0].success, Some(true));
    assert_eq!(found[0].runtime, Some(12.34));

    let err = store.update_powertest("run2", true, 1.0).await.unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let ws = workspace();
    let start = NaiveDate::from_ymd_opt(2025, 2, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    {
        let store = ws.store().await;
        store
            .add_test_result(&NewTestResult {
                start_time: start,
                backend: Backend::Postgres,
                success: true,
                row_count: 4,
                result_csv: "postgres_q1_2025-02-01-080000.csv".to_string(),
                query_name: "1".to_string(),
                runtime: 0.5,
                result_folder: None,
            })
            .await
            .unwrap();
        store.close().await;
    }

    let store = ResultStore::open(&ws.paths.state_db, &ws.paths.result_dir)
        .await
        .unwrap();
    let results = store
        .get_test_results(Some(Backend::Postgres), None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].start_time, start);
}

#[tokio::test]
async fn test_delete_power_test_after_run() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    let folder = runner.power_test(false).await.unwrap().result_folder.unwrap();
    runner.run_query(1, None, false).await.unwrap();

    let store = runner.store().clone();
    let test = store.get_powertests(None, Some(&folder)).await.unwrap().remove(0);
    let owned = store
        .get_test_results_from_powertest(None, Some(&folder), None)
        .await
        .unwrap();

    let err = store.delete_test_result(owned[0].id).await.unwrap_err();
    assert!(matches!(err, RunnerError::OwnershipConflict(_)));

    assert_eq!(store.delete_powertest(None, Some(&folder)).await.unwrap(), folder);
    assert!(!ws.paths.result_dir.join(&folder).exists());
    assert!(store.get_powertests(None, None).await.unwrap().is_empty());
    assert!(store
        .get_test_results_from_powertest(None, Some(&folder), None)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        store.get_powertest(test.id).await.unwrap_err(),
        RunnerError::NotFound(_)
    ));

    // the stand-alone run is untouched
    let standalone = store.get_test_results(None, None).await.unwrap();
    assert_eq!(standalone.len(), 1);
    store.delete_test_result(standalone[0].id).await.unwrap();
    assert!(store.get_test_results(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_powertest_runtime_matches_run() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    let summary = runner.power_test(false).await.unwrap();
    let folder = summary.result_folder.clone().unwrap();

    let store = runner.store();
    let id = store.get_powertests(None, Some(&folder)).await.unwrap()[0].id;
    let runtime = store.get_powertest_runtime(id).await.unwrap();

    assert_eq!(runtime.backend, Backend::Sqlite);
    assert_eq!(runtime.result_folder, folder);
    assert_eq!(runtime.per_query.len(), 22);
    for q in &summary.queries {
        assert_eq!(runtime.per_query[q.index - 1], q.runtime);
    }
    assert!((runtime.total - summary.runtime).abs() < 1e-9);
}
