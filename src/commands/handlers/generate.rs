//! `generate` command handler.

use crate::commands::{CommandContext, CommandOutput};
use crate::error::Result;
use crate::tpch::DataGenerator;

pub async fn handle(
    table: Option<&str>,
    scale_factor: u32,
    ctx: &CommandContext,
) -> Result<CommandOutput> {
    let generator = DataGenerator::new(&ctx.paths.dbgen_dir, &ctx.paths.data_dir, scale_factor);

    let outcomes = match table {
        Some(table) => {
            let (ok, _) = generator.generate(table).await?;
            vec![(table.to_string(), ok)]
        }
        None => generator.generate_all().await?,
    };

    let rows = outcomes
        .into_iter()
        .map(|(table, ok)| vec![table, if ok { "generated" } else { "failed" }.to_string()])
        .collect();
    Ok(CommandOutput::Multiple(vec![
        CommandOutput::table(&["table", "status"], rows),
        CommandOutput::info(format!("Data folder: {}", generator.output_dir().display())),
    ]))
}
