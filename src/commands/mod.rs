//! Command dispatch for tpch-runner.
//!
//! Handlers are independent of the presentation layer: they take a
//! [`CommandContext`] and return a [`CommandOutput`] that the binary renders.

pub mod handlers;
pub mod output;

pub use output::CommandOutput;

use crate::cli::Command;
use crate::compare::Comparator;
use crate::config::{CompareConfig, ConnectionConfig, Paths};
use crate::db;
use crate::error::{Result, RunnerError};
use crate::persistence::ResultStore;
use crate::tpch::TpchRunner;

/// Everything a handler needs, built once per invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub paths: Paths,
    pub compare: CompareConfig,
    pub store: ResultStore,
    pub connection: Option<ConnectionConfig>,
    pub scale: String,
}

impl CommandContext {
    /// Builds an orchestrator over a fresh, unopened connection.
    pub fn runner(&self) -> Result<TpchRunner> {
        let config = self.connection.as_ref().ok_or_else(|| {
            RunnerError::config("No database connection configured. Use --url or --connection.")
        })?;
        let conn = db::connect(config)?;
        Ok(TpchRunner::new(
            conn,
            self.paths.clone(),
            self.store.clone(),
            self.scale.clone(),
        ))
    }

    pub fn comparator(&self) -> Comparator {
        Comparator::new(
            &self.paths.result_dir,
            &self.paths.answer_dir,
            self.compare.clone(),
        )
    }
}

/// Routes a parsed command to its handler.
pub async fn dispatch(command: &Command, ctx: &CommandContext) -> Result<CommandOutput> {
    match command {
        Command::Db { action } => handlers::db::handle(action, ctx).await,
        Command::Run { index, no_report } => handlers::run::handle(*index, *no_report, ctx).await,
        Command::Power { action } => handlers::power::handle(action, ctx).await,
        Command::Results { action } => handlers::results::handle(action, ctx).await,
        Command::Generate {
            table,
            scale_factor,
        } => handlers::generate::handle(table.as_deref(), *scale_factor, ctx).await,
    }
}

/// Renders an optional flag the way the result tables show it.
pub(crate) fn format_success(success: Option<bool>) -> String {
    match success {
        Some(true) => "succeed".to_string(),
        Some(false) => "fail".to_string(),
        None => "-".to_string(),
    }
}

/// Renders seconds with four decimals.
pub(crate) fn format_runtime(runtime: Option<f64>) -> String {
    runtime.map(|r| format!("{r:.4}")).unwrap_or_else(|| "-".to_string())
}
