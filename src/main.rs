//! tpch-runner - TPC-H power tests and answer validation across database backends.

use anyhow::Context;
use tpch_runner::cli::Cli;
use tpch_runner::commands::{self, CommandContext};
use tpch_runner::config::{Config, Paths};
use tpch_runner::logging;
use tpch_runner::persistence::ResultStore;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let paths = match &cli.workdir {
        Some(dir) => Paths::rooted_at(dir),
        None => config.paths.clone(),
    };

    let connection = if cli.needs_connection() {
        let connection = cli
            .resolve_connection(&config)?
            .context("No database connection configured. Use --url or --connection.")?;
        info!("Connection: {}", connection.display_string());
        Some(connection)
    } else {
        None
    };

    let store = ResultStore::open(&paths.state_db, &paths.result_dir)
        .await
        .with_context(|| format!("Cannot open result store {}", paths.state_db.display()))?;

    let ctx = CommandContext {
        paths,
        compare: config.compare.clone(),
        store: store.clone(),
        connection,
        scale: cli.scale.clone(),
    };

    let outcome = commands::dispatch(&cli.command, &ctx).await;
    store.close().await;
    let output = outcome?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output.to_json())?);
    } else {
        println!("{}", output.render_text());
    }
    Ok(())
}
