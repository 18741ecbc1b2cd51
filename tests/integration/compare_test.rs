//! Power test validation against an answer corpus on disk.

use std::path::Path;

use tpch_runner::compare::Comparator;
use tpch_runner::config::CompareConfig;
use tpch_runner::error::RunnerError;

use super::common::{workspace, Workspace};

/// Copies a run's artifacts into the answer corpus for `scale`.
fn seed_answers(ws: &Workspace, folder: &str, scale: &str) {
    let answers = ws.paths.answer_dir.join(scale);
    std::fs::create_dir_all(&answers).unwrap();
    for n in 1..=22 {
        let name = format!("{n}.csv");
        std::fs::copy(
            ws.paths.result_dir.join(folder).join(&name),
            answers.join(&name),
        )
        .unwrap();
    }
}

fn comparator(ws: &Workspace) -> Comparator {
    Comparator::new(&ws.paths.result_dir, &ws.paths.answer_dir, CompareConfig::default())
}

fn replace_in(path: &Path, from: &str, to: &str) {
    let text = std::fs::read_to_string(path).unwrap();
    std::fs::write(path, text.replace(from, to)).unwrap();
}

#[tokio::test]
async fn test_validate_power_test() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    let folder = runner.power_test(false).await.unwrap().result_folder.unwrap();
    seed_answers(&ws, &folder, "small");

    let store = runner.store().clone();
    let id = store.get_powertests(None, Some(&folder)).await.unwrap()[0].id;

    let (all_pass, name) = store.compare_powertest(id, &comparator(&ws)).await.unwrap();
    assert!(all_pass);
    assert_eq!(name, folder);

    // small numeric drift stays within tolerance
    let q15 = ws.paths.answer_dir.join("small").join("15.csv");
    replace_in(&q15, "173665.47", "173665.475");
    assert!(store.compare_powertest(id, &comparator(&ws)).await.unwrap().0);

    // a different value fails the run without raising
    replace_in(&q15, "173665.475", "173000.00");
    assert!(!store.compare_powertest(id, &comparator(&ws)).await.unwrap().0);

    // a missing answer aborts validation
    std::fs::remove_file(ws.paths.answer_dir.join("small").join("22.csv")).unwrap();
    let err = store
        .compare_powertest(id, &comparator(&ws))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));
}

#[tokio::test]
async fn test_validate_uses_backend_answers_first() {
    let ws = workspace();
    let mut runner = ws.loaded_runner().await;
    let folder = runner.power_test(false).await.unwrap().result_folder.unwrap();
    seed_answers(&ws, &folder, "small");

    let backend_answers = ws.paths.answer_dir.join("small").join("sqlite");
    std::fs::create_dir_all(&backend_answers).unwrap();
    for n in 1..=22 {
        let name = format!("{n}.csv");
        std::fs::copy(ws.paths.answer_dir.join("small").join(&name), backend_answers.join(&name))
            .unwrap();
    }
    replace_in(&backend_answers.join("3.csv"), "ARGENTINA", "ARGENTINIA");

    let store = runner.store().clone();
    let id = store.get_powertests(None, Some(&folder)).await.unwrap()[0].id;
    assert!(!store.compare_powertest(id, &comparator(&ws)).await.unwrap().0);
}

#[tokio::test]
async fn test_validate_unknown_power_test() {
    let ws = workspace();
    let store = ws.store().await;
    let err = store.compare_powertest(42, &comparator(&ws)).await.unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));
    assert!(err.to_string().contains("PowerTest 42 not found."));
}
