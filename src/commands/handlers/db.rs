//! `db` command handlers: schema and data lifecycle.

use crate::cli::DbAction;
use crate::commands::{CommandContext, CommandOutput};
use crate::error::Result;

pub async fn handle(action: &DbAction, ctx: &CommandContext) -> Result<CommandOutput> {
    let mut runner = ctx.runner()?;
    let backend = runner.backend();

    match action {
        DbAction::Create => {
            runner.create_tables().await?;
            Ok(CommandOutput::info(format!("All tables are created on {backend}.")))
        }
        DbAction::Load {
            table: Some(table),
            data_dir,
            delimiter,
        } => {
            let rows = runner
                .load_single_table(table, data_dir.as_deref(), *delimiter)
                .await?;
            Ok(CommandOutput::info(format!("{table}: {rows} rows")))
        }
        DbAction::Load {
            table: None,
            data_dir,
            delimiter,
        } => {
            let report = runner.load_data(data_dir.as_deref(), *delimiter).await?;
            let mut rows: Vec<Vec<String>> = report
                .loaded
                .iter()
                .map(|(table, count)| vec![table.clone(), count.to_string(), "loaded".to_string()])
                .collect();
            rows.extend(report.failed.iter().map(|(table, reason)| {
                vec![table.clone(), "-".to_string(), format!("failed: {reason}")]
            }));
            Ok(CommandOutput::table(&["table", "rows", "status"], rows))
        }
        DbAction::Truncate { table } => {
            let message = if runner.truncate_table(table).await {
                format!("Table {table} is truncated.")
            } else {
                format!("Truncate table {table} fails, see log for details.")
            };
            Ok(CommandOutput::info(message))
        }
        DbAction::Drop { table } => {
            let message = if runner.drop_table(table).await {
                format!("Table {table} are dropped.")
            } else {
                format!("Drop table {table} fails, see log for details.")
            };
            Ok(CommandOutput::info(message))
        }
        DbAction::DropIndexes => {
            let dropped = runner.drop_indexes().await?;
            Ok(CommandOutput::info(format!(
                "All IDX indexes are dropped on {backend} ({dropped} dropped)."
            )))
        }
        DbAction::Reindex { bypass } => {
            runner.after_load(*bypass).await?;
            Ok(CommandOutput::info(format!(
                "After-load maintenance finished on {backend}, state: {}.",
                runner.state()
            )))
        }
    }
}
