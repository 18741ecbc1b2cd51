//! Per-query CSV result artifacts.
//!
//! One file per executed query: a header row of column names followed by the
//! rows rendered as text. NULL is written as an empty cell.

use std::path::Path;

use serde::Serialize;

use crate::db::QueryOutcome;
use crate::error::{Result, RunnerError};

/// A CSV artifact loaded as text cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Renders a query outcome. Outcomes without a row set produce an empty table.
    pub fn from_outcome(outcome: &QueryOutcome) -> Self {
        let headers = outcome.columns.clone().unwrap_or_default();
        let rows = outcome
            .rows
            .as_ref()
            .map(|rows| {
                rows.iter()
                    .map(|row| row.iter().map(|v| v.to_csv_field()).collect())
                    .collect()
            })
            .unwrap_or_default();
        Self { headers, rows }
    }

    /// Reads a CSV artifact. A missing file is a `NotFound` error.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RunnerError::not_found(format!(
                "Result file {} does not exist",
                path.display()
            )));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| csv_error(path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| csv_error(path, e))?
            .iter()
            .map(String::from)
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(path, e))?;
            rows.push(record.iter().map(String::from).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Writes the table as CSV, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
        if !self.headers.is_empty() {
            writer.write_record(&self.headers).map_err(|e| csv_error(path, e))?;
        }
        for row in &self.rows {
            writer.write_record(row).map_err(|e| csv_error(path, e))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Renders an aligned text table for logs and terminal output.
    pub fn render(&self) -> String {
        let cols = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);
        let mut widths = vec![0; cols];
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            for (i, cell) in line.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let format_line = |line: &Vec<String>| {
            line.iter()
                .enumerate()
                .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
                .collect::<Vec<_>>()
                .join(" | ")
        };

        let mut out = format_line(&self.headers);
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for row in &self.rows {
            out.push('\n');
            out.push_str(&format_line(row));
        }
        out
    }
}

fn csv_error(path: &Path, error: csv::Error) -> RunnerError {
    RunnerError::comparison(format!("CSV error in {}: {error}", path.display()))
}
