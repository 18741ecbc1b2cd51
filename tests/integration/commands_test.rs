//! Command handlers driven the way the binary drives them.

use serde_json::json;
use tpch_runner::cli::{Command, DbAction, PowerAction, ResultAction};
use tpch_runner::commands::{dispatch, CommandContext, CommandOutput};
use tpch_runner::config::CompareConfig;
use tpch_runner::error::RunnerError;

use super::common::{workspace, Workspace};

async fn context(ws: &Workspace) -> CommandContext {
    CommandContext {
        paths: ws.paths.clone(),
        compare: CompareConfig::default(),
        store: ws.store().await,
        connection: Some(ws.connection_config()),
        scale: "small".to_string(),
    }
}

#[tokio::test]
async fn test_db_commands_then_power_run() {
    let ws = workspace();
    let ctx = context(&ws).await;

    let created = dispatch(&Command::Db { action: DbAction::Create }, &ctx).await.unwrap();
    assert_eq!(created, CommandOutput::info("All tables are created on sqlite."));

    let loaded = dispatch(
        &Command::Db {
            action: DbAction::Load {
                table: None,
                data_dir: None,
                delimiter: '|',
            },
        },
        &ctx,
    )
    .await
    .unwrap();
    let json = loaded.to_json();
    assert_eq!(json.as_array().unwrap().len(), 8);
    assert_eq!(json[1], json!({ "table": "nation", "rows": "5", "status": "loaded" }));

    let run = dispatch(&Command::Power { action: PowerAction::Run { no_report: false } }, &ctx)
        .await
        .unwrap();
    assert!(run.render_text().contains("Power test succeeds"));

    let listed = dispatch(&Command::Power { action: PowerAction::List { backend: None } }, &ctx)
        .await
        .unwrap();
    let rows = listed.to_json();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["status"], json!("succeed"));
    let id: i64 = rows[0]["id"].as_str().unwrap().parse().unwrap();

    let shown = dispatch(&Command::Power { action: PowerAction::Show { id } }, &ctx)
        .await
        .unwrap();
    assert!(shown.render_text().contains("Total runtime"));

    let deleted = dispatch(&Command::Power { action: PowerAction::Delete { id } }, &ctx)
        .await
        .unwrap();
    assert!(deleted.render_text().contains("are deleted"));
}

#[tokio::test]
async fn test_result_commands() {
    let ws = workspace();
    let ctx = context(&ws).await;
    ws.loaded_runner().await;

    dispatch(&Command::Run { index: 2, no_report: false }, &ctx).await.unwrap();
    let listed = dispatch(&Command::Results { action: ResultAction::List { backend: None } }, &ctx)
        .await
        .unwrap()
        .to_json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["rows"], json!("2"));
    let id: i64 = listed[0]["id"].as_str().unwrap().parse().unwrap();

    let shown = dispatch(&Command::Results { action: ResultAction::Show { id } }, &ctx)
        .await
        .unwrap();
    assert!(shown.render_text().contains("ARGENTINA"));

    dispatch(&Command::Results { action: ResultAction::Delete { id } }, &ctx)
        .await
        .unwrap();
    let err = dispatch(&Command::Results { action: ResultAction::Show { id } }, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));
}

#[tokio::test]
async fn test_runner_commands_need_a_connection() {
    let ws = workspace();
    let mut ctx = context(&ws).await;
    ctx.connection = None;

    let err = dispatch(&Command::Db { action: DbAction::Create }, &ctx).await.unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));

    // store-only commands still work
    let listed = dispatch(&Command::Power { action: PowerAction::List { backend: None } }, &ctx)
        .await
        .unwrap();
    assert_eq!(listed.to_json(), json!([]));
}

#[tokio::test]
async fn test_compare_commands() {
    let ws = workspace();
    let ctx = context(&ws).await;
    ws.loaded_runner().await;

    dispatch(&Command::Power { action: PowerAction::Run { no_report: false } }, &ctx)
        .await
        .unwrap();
    ws.override_query(7, "select * from missing_table;");
    dispatch(&Command::Power { action: PowerAction::Run { no_report: false } }, &ctx)
        .await
        .unwrap();

    let tests = ctx.store.get_powertests(None, None).await.unwrap();
    let (newest, oldest) = (tests[0].id, tests[1].id);
    let json = dispatch(
        &Command::Power { action: PowerAction::Compare { source: oldest, dest: newest } },
        &ctx,
    )
    .await
    .unwrap()
    .to_json();
    assert_eq!(json[0][2], json!({ "attribute": "Success", "source": "succeed", "destination": "fail" }));
    let queries = json[1].as_array().unwrap();
    assert_eq!(queries.len(), 22);
    let q7 = queries.iter().find(|q| q["query"] == json!("Q7")).unwrap();
    assert_eq!(q7["rows_1"], json!("5"));
    assert_eq!(q7["rows_2"], json!("-1"));

    dispatch(&Command::Run { index: 2, no_report: false }, &ctx).await.unwrap();
    dispatch(&Command::Run { index: 3, no_report: false }, &ctx).await.unwrap();
    let results = ctx.store.get_test_results(None, None).await.unwrap();
    let json = dispatch(
        &Command::Results {
            action: ResultAction::Compare { source: results[0].id, dest: results[1].id },
        },
        &ctx,
    )
    .await
    .unwrap()
    .to_json();
    assert_eq!(json.as_array().unwrap().len(), 5);
    assert_eq!(json[3]["attribute"], json!("Rowcount"));
}

#[tokio::test]
async fn test_drop_indexes_is_mysql_only() {
    let ws = workspace();
    let ctx = context(&ws).await;

    let err = dispatch(&Command::Db { action: DbAction::DropIndexes }, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Config(_)));
    assert!(err.to_string().contains("only supported on mysql"));
}
