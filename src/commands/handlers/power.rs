//! `power` command handlers.

use crate::cli::PowerAction;
use crate::commands::{format_runtime, format_success, CommandContext, CommandOutput};
use crate::error::Result;
use crate::persistence::{PowerTest, TestResult};

pub async fn handle(action: &PowerAction, ctx: &CommandContext) -> Result<CommandOutput> {
    match action {
        PowerAction::Run { no_report } => {
            let mut runner = ctx.runner()?;
            let summary = runner.power_test(*no_report).await?;

            let rows = summary
                .queries
                .iter()
                .map(|q| {
                    vec![
                        format!("Q{}", q.index),
                        format_success(Some(q.success)),
                        q.row_count.to_string(),
                        format_runtime(Some(q.runtime)),
                    ]
                })
                .collect();
            let mut message = format!(
                "Power test {}, total time: {:.4} secs.",
                if summary.success { "succeeds" } else { "fails" },
                summary.runtime
            );
            if let Some(folder) = &summary.result_folder {
                message.push_str(&format!("\nResult folder: {folder}"));
            }

            Ok(CommandOutput::Multiple(vec![
                CommandOutput::table(&["query", "status", "rows", "runtime"], rows),
                CommandOutput::info(message),
            ]))
        }
        PowerAction::List { backend } => {
            let tests = ctx.store.get_powertests(*backend, None).await?;
            Ok(powertest_table(&tests))
        }
        PowerAction::Show { id } => {
            let test = ctx.store.get_powertest(*id).await?;
            let runtime = ctx.store.get_powertest_runtime(*id).await?;
            let results = ctx
                .store
                .get_test_results_from_powertest(None, Some(&test.result_folder), None)
                .await?;

            let rows = results
                .iter()
                .map(|r| {
                    vec![
                        r.id.to_string(),
                        format!("Q{}", r.query_name),
                        format_success(Some(r.success)),
                        r.row_count.to_string(),
                        format_runtime(Some(r.runtime)),
                        r.result_csv.clone(),
                    ]
                })
                .collect();
            let per_query = runtime
                .per_query
                .iter()
                .enumerate()
                .map(|(i, secs)| vec![format!("Q{}", i + 1), format!("{secs:.4}")])
                .collect();

            Ok(CommandOutput::Multiple(vec![
                powertest_table(std::slice::from_ref(&test)),
                CommandOutput::table(&["id", "query", "status", "rows", "runtime", "file"], rows),
                CommandOutput::table(&["query", "runtime"], per_query),
                CommandOutput::info(format!("Total runtime: {:.4} secs.", runtime.total)),
            ]))
        }
        PowerAction::Delete { id } => {
            let folder = ctx.store.delete_powertest(Some(*id), None).await?;
            Ok(CommandOutput::info(format!(
                "Power test {id} and its results in {folder} are deleted."
            )))
        }
        PowerAction::Compare { source, dest } => {
            let cmp = ctx.store.compare_powertests(*source, *dest).await?;
            let (src, dst) = (&cmp.source, &cmp.dest);
            let attributes = vec![
                vec!["Database".to_string(), src.backend.to_string(), dst.backend.to_string()],
                vec!["Scale".to_string(), src.scale.clone(), dst.scale.clone()],
                vec![
                    "Success".to_string(),
                    format_success(src.success),
                    format_success(dst.success),
                ],
                vec![
                    "Runtime (s)".to_string(),
                    format_runtime(src.runtime),
                    format_runtime(dst.runtime),
                ],
                vec![
                    "Result Folder".to_string(),
                    src.result_folder.clone(),
                    dst.result_folder.clone(),
                ],
            ];

            let queries = cmp
                .queries
                .iter()
                .map(|pair| {
                    let side = |r: &Option<TestResult>| match r {
                        Some(r) => (
                            format_success(Some(r.success)),
                            r.row_count.to_string(),
                            format_runtime(Some(r.runtime)),
                        ),
                        None => ("-".to_string(), "-".to_string(), "-".to_string()),
                    };
                    let (ok1, rows1, secs1) = side(&pair.source);
                    let (ok2, rows2, secs2) = side(&pair.dest);
                    vec![format!("Q{}", pair.index), ok1, ok2, rows1, rows2, secs1, secs2]
                })
                .collect();

            Ok(CommandOutput::Multiple(vec![
                CommandOutput::table(&["attribute", "source", "destination"], attributes),
                CommandOutput::table(
                    &["query", "status_1", "status_2", "rows_1", "rows_2", "runtime_1", "runtime_2"],
                    queries,
                ),
            ]))
        }
        PowerAction::Validate { id } => {
            let comparator = ctx.comparator();
            let (all_pass, folder) = ctx.store.compare_powertest(*id, &comparator).await?;
            Ok(CommandOutput::info(format!(
                "Power test {id} ({folder}) validation {}.",
                if all_pass { "passes" } else { "fails" }
            )))
        }
    }
}

fn powertest_table(tests: &[PowerTest]) -> CommandOutput {
    let rows = tests
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.backend.to_string(),
                t.scale.clone(),
                t.result_folder.clone(),
                t.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                format_success(t.success),
                format_runtime(t.runtime),
            ]
        })
        .collect();
    CommandOutput::table(
        &["id", "backend", "scale", "result_folder", "start_time", "status", "runtime"],
        rows,
    )
}
