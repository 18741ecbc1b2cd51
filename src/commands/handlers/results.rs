//! `result` command handlers for stand-alone query results.

use crate::cli::ResultAction;
use crate::commands::{format_runtime, format_success, CommandContext, CommandOutput};
use crate::error::Result;

pub async fn handle(action: &ResultAction, ctx: &CommandContext) -> Result<CommandOutput> {
    match action {
        ResultAction::List { backend } => {
            let results = ctx.store.get_test_results(*backend, None).await?;
            let rows = results
                .iter()
                .map(|r| {
                    vec![
                        r.id.to_string(),
                        r.backend.to_string(),
                        format!("Q{}", r.query_name),
                        r.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                        format_success(Some(r.success)),
                        r.row_count.to_string(),
                        format_runtime(Some(r.runtime)),
                        r.result_csv.clone(),
                    ]
                })
                .collect();
            Ok(CommandOutput::table(
                &["id", "backend", "query", "start_time", "status", "rows", "runtime", "file"],
                rows,
            ))
        }
        ResultAction::Show { id } => {
            let (result, table) = ctx.store.read_result(*id).await?;
            Ok(CommandOutput::Multiple(vec![
                CommandOutput::info(format!(
                    "Result {id}: Q{} on {}, {} rows, {} secs ({})",
                    result.query_name,
                    result.backend,
                    result.row_count,
                    format_runtime(Some(result.runtime)),
                    ctx.store.artifact_path(&result).display()
                )),
                CommandOutput::from_result_table(table),
            ]))
        }
        ResultAction::Compare { source, dest } => {
            let (src, dst) = ctx.store.compare_results(*source, *dest).await?;
            let rows = vec![
                vec!["Database".to_string(), src.backend.to_string(), dst.backend.to_string()],
                vec!["Query".to_string(), format!("Q{}", src.query_name), format!("Q{}", dst.query_name)],
                vec![
                    "Success".to_string(),
                    format_success(Some(src.success)),
                    format_success(Some(dst.success)),
                ],
                vec!["Rowcount".to_string(), src.row_count.to_string(), dst.row_count.to_string()],
                vec![
                    "Runtime (s)".to_string(),
                    format_runtime(Some(src.runtime)),
                    format_runtime(Some(dst.runtime)),
                ],
            ];
            Ok(CommandOutput::table(&["attribute", "source", "destination"], rows))
        }
        ResultAction::Delete { id } => {
            ctx.store.delete_test_result(*id).await?;
            Ok(CommandOutput::info(format!("Result {id} is deleted.")))
        }
    }
}
