//! Table data generation through the external `dbgen` tool.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{error, info};

use crate::error::{Result, RunnerError};

/// `dbgen -T` code for each table.
pub const TABLE_CODES: [(&str, &str); 8] = [
    ("region", "r"),
    ("nation", "n"),
    ("customer", "c"),
    ("part", "P"),
    ("supplier", "s"),
    ("partsupp", "S"),
    ("orders", "O"),
    ("lineitem", "L"),
];

/// Returns the `dbgen -T` code for a table.
pub fn table_code(table: &str) -> Option<&'static str> {
    TABLE_CODES
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, code)| *code)
}

/// Runs `dbgen` out of process, one table at a time.
#[derive(Debug, Clone)]
pub struct DataGenerator {
    tool_dir: PathBuf,
    data_dir: PathBuf,
    scale_factor: u32,
}

impl DataGenerator {
    pub fn new(tool_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>, scale_factor: u32) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            data_dir: data_dir.into(),
            scale_factor,
        }
    }

    /// Folder receiving `.tbl` files for this scale factor.
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(format!("sf{}", self.scale_factor))
    }

    fn dbgen_path(&self) -> PathBuf {
        self.tool_dir.join("dbgen")
    }

    /// Generates one table. Returns the tool's success flag and its output
    /// (stdout on success, stderr on failure).
    pub async fn generate(&self, table: &str) -> Result<(bool, String)> {
        let code = table_code(table)
            .ok_or_else(|| RunnerError::config(format!("Unknown table '{table}'")))?;
        let out_dir = self.output_dir();
        tokio::fs::create_dir_all(&out_dir).await?;

        let started = Instant::now();
        let output = Command::new(self.dbgen_path())
            .args(["-T", code, "-f", "-s", &self.scale_factor.to_string()])
            .current_dir(&self.tool_dir)
            .env("DSS_PATH", &out_dir)
            .env("DSS_CONFIG", &self.tool_dir)
            .env("DSS_DIST", "dists.dss")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                RunnerError::not_found(format!(
                    "Cannot run {}: {e}",
                    self.dbgen_path().display()
                ))
            })?;

        if output.status.success() {
            info!(
                table,
                elapsed = %format!("{:.4}", started.elapsed().as_secs_f64()),
                "dbgen succeeds"
            );
            Ok((true, String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(table, "dbgen fails, error: {}", stderr.trim());
            Ok((false, stderr))
        }
    }

    /// Generates every table, continuing past failures.
    pub async fn generate_all(&self) -> Result<Vec<(String, bool)>> {
        let mut results = Vec::with_capacity(TABLE_CODES.len());
        for (table, _) in TABLE_CODES {
            let (ok, _) = self.generate(table).await?;
            results.push((table.to_string(), ok));
        }
        Ok(results)
    }
}
