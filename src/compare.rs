//! Answer validation.
//!
//! Compares a candidate result CSV with the reference answer for the same
//! query. Numeric columns compare within a tolerance, text columns compare
//! after trimming, and row order matters.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::artifact::ResultTable;
use crate::config::CompareConfig;
use crate::db::Backend;
use crate::error::{Result, RunnerError};

/// Relative tolerance applied on top of the absolute one.
const RELATIVE_TOLERANCE: f64 = 1e-5;

/// Identifies which result artifacts a comparison reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonContext {
    pub backend: Backend,
    /// Power-test folder, or `None` for stand-alone results.
    pub result_folder: Option<String>,
    pub scale: String,
}

/// Decides whether one result file matches its answer.
pub trait AnswerComparator: Send + Sync {
    /// Number of per-query answers (`1.csv` ..= `N.csv`) to check.
    fn answer_queries(&self) -> usize;

    /// Returns false when values differ; errors when either file is missing.
    fn compare(&self, context: &ComparisonContext, result_file: &str) -> Result<bool>;
}

/// File-backed comparator over the result and answer directories.
#[derive(Debug, Clone)]
pub struct Comparator {
    result_dir: PathBuf,
    answer_dir: PathBuf,
    settings: CompareConfig,
}

impl Comparator {
    pub fn new(result_dir: impl Into<PathBuf>, answer_dir: impl Into<PathBuf>, settings: CompareConfig) -> Self {
        Self {
            result_dir: result_dir.into(),
            answer_dir: answer_dir.into(),
            settings,
        }
    }

    /// Answer folder for a backend and scale: `<scale>/<backend>/` when it
    /// exists, otherwise the shared `<scale>/`.
    pub fn answer_folder(&self, backend: Backend, scale: &str) -> Result<PathBuf> {
        let shared = self.answer_dir.join(scale);
        let specific = shared.join(backend.as_str());
        if specific.is_dir() {
            Ok(specific)
        } else if shared.is_dir() {
            Ok(shared)
        } else {
            Err(RunnerError::not_found(format!(
                "Answer folder {} does not exist",
                shared.display()
            )))
        }
    }

    fn result_path(&self, context: &ComparisonContext, result_file: &str) -> PathBuf {
        match &context.result_folder {
            Some(folder) => self.result_dir.join(folder).join(result_file),
            None => self.result_dir.join(result_file),
        }
    }

    /// Compares two files directly.
    pub fn compare_files(&self, candidate: &Path, answer: &Path) -> Result<bool> {
        let candidate = ResultTable::read(candidate)?;
        let answer = ResultTable::read(answer)?;
        Ok(compare_tables(&candidate, &answer, self.settings.precision))
    }
}

impl AnswerComparator for Comparator {
    fn answer_queries(&self) -> usize {
        self.settings.answer_queries as usize
    }

    fn compare(&self, context: &ComparisonContext, result_file: &str) -> Result<bool> {
        let candidate_path = self.result_path(context, result_file);
        let answer_path = self
            .answer_folder(context.backend, &context.scale)?
            .join(answer_file_name(result_file)?);
        debug!(
            candidate = %candidate_path.display(),
            answer = %answer_path.display(),
            "comparing"
        );
        self.compare_files(&candidate_path, &answer_path)
    }
}

/// Stand-alone artifacts are named `<backend>_q<n>_<timestamp>.csv`; the
/// answer corpus names files `<n>.csv`.
fn answer_file_name(result_file: &str) -> Result<String> {
    let stem = result_file.strip_suffix(".csv").unwrap_or(result_file);
    if stem.parse::<usize>().is_ok() {
        return Ok(format!("{stem}.csv"));
    }
    stem.split('_')
        .find_map(|part| part.strip_prefix('q').and_then(|n| n.parse::<usize>().ok()))
        .map(|n| format!("{n}.csv"))
        .ok_or_else(|| {
            RunnerError::comparison(format!("Cannot infer query index from {result_file}"))
        })
}

/// Compares candidate and answer tables cell by cell.
///
/// When headers differ but the column counts match, the answer adopts the
/// candidate's labels by position.
pub fn compare_tables(candidate: &ResultTable, answer: &ResultTable, precision: f64) -> bool {
    if candidate.column_count() != answer.column_count() {
        error!(
            "Column count differs: result has {}, answer has {}",
            candidate.column_count(),
            answer.column_count()
        );
        report_mismatch(candidate, answer);
        return false;
    }

    let mut answer = answer.clone();
    if candidate.headers != answer.headers {
        warn!(
            "Column labels differ ({:?} vs {:?}); aligning answer columns by position",
            candidate.headers, answer.headers
        );
        answer.headers = candidate.headers.clone();
    }

    if candidate.rows.len() != answer.rows.len() {
        error!(
            "Row count differs: result has {}, answer has {}",
            candidate.rows.len(),
            answer.rows.len()
        );
        report_mismatch(candidate, &answer);
        return false;
    }

    for col in 0..candidate.column_count() {
        let numeric = is_numeric_column(candidate, col) && is_numeric_column(&answer, col);
        for (row_idx, (c_row, a_row)) in candidate.rows.iter().zip(&answer.rows).enumerate() {
            let c = c_row.get(col).map(String::as_str).unwrap_or("");
            let a = a_row.get(col).map(String::as_str).unwrap_or("");
            let same = if numeric {
                numbers_close(c, a, precision)
            } else {
                c.trim() == a.trim()
            };
            if !same {
                error!(
                    column = %candidate.headers[col],
                    row = row_idx,
                    "value differs: result {c:?}, answer {a:?}"
                );
                report_mismatch(candidate, &answer);
                return false;
            }
        }
    }

    true
}

fn is_numeric_column(table: &ResultTable, col: usize) -> bool {
    let mut cells = table
        .rows
        .iter()
        .filter_map(|row| row.get(col))
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .peekable();
    cells.peek().is_some() && cells.all(|cell| cell.parse::<f64>().is_ok())
}

fn numbers_close(candidate: &str, answer: &str, precision: f64) -> bool {
    let (c, a) = (candidate.trim(), answer.trim());
    if c.is_empty() || a.is_empty() {
        return c.is_empty() && a.is_empty();
    }
    match (c.parse::<f64>(), a.parse::<f64>()) {
        (Ok(c), Ok(a)) => (c - a).abs() <= precision + RELATIVE_TOLERANCE * a.abs(),
        _ => false,
    }
}

fn report_mismatch(candidate: &ResultTable, answer: &ResultTable) {
    error!("Result:\n{}", candidate.render());
    error!("Answer:\n{}", answer.render());
}
