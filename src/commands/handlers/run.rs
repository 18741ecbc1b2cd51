//! `run` command handler: one query.

use crate::artifact::ResultTable;
use crate::commands::{CommandContext, CommandOutput};
use crate::error::Result;

pub async fn handle(index: usize, no_report: bool, ctx: &CommandContext) -> Result<CommandOutput> {
    let mut runner = ctx.runner()?;
    let run = runner.run_query(index, None, no_report).await?;

    let mut summary = if run.success {
        format!(
            "Q{index} succeeds, return {} rows in {:.4} seconds.",
            run.outcome.row_count, run.runtime
        )
    } else {
        format!("Q{index} fails after {:.4} seconds.", run.runtime)
    };
    if let Some(file) = &run.context.result_file {
        summary.push_str(&format!("\nResult saved to {}", file.display()));
    }

    let mut outputs = vec![CommandOutput::info(summary)];
    if run.outcome.has_rows() {
        outputs.push(CommandOutput::from_result_table(ResultTable::from_outcome(
            &run.outcome,
        )));
    }
    Ok(CommandOutput::Multiple(outputs))
}
