//! Coverage matrix for statistical fault localization.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Matrix output errors.
#[derive(Debug, Error)]
pub enum MatrixError {
    /// IO failure.
    #[error("io error writing {}: {source}", path.display())]
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Rows of goal coverage plus pass/fail, one row per executed test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMatrix {
    goal_count: usize,
    rows: Vec<Vec<bool>>,
}

impl CoverageMatrix {
    /// Number of goal columns, excluding the pass/fail column.
    pub fn goal_count(&self) -> usize {
        self.goal_count
    }

    /// Every row, the last cell being pass/fail.
    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    /// Cell at `row`, `col`; column `goal_count` is pass/fail.
    pub fn cell(&self, row: usize, col: usize) -> Option<bool> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Whether the test of `row` passed.
    pub fn passed(&self, row: usize) -> Option<bool> {
        self.cell(row, self.goal_count)
    }

    /// Text form: tests covering no goal are omitted.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let (goals, verdict) = row.split_at(self.goal_count);
            if !goals.iter().any(|&covered| covered) {
                continue;
            }
            for &covered in goals {
                out.push_str(if covered { "1 " } else { "0 " });
            }
            out.push_str(if verdict.first().copied().unwrap_or(false) {
                "+"
            } else {
                "-"
            });
            out.push('\n');
        }
        out
    }

    /// Write `<report_dir>/data/<target>.matrix`, creating directories.
    pub fn write(&self, report_dir: &Path, target: &str) -> Result<PathBuf, MatrixError> {
        let dir = report_dir.join("data");
        fs::create_dir_all(&dir).map_err(|source| MatrixError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("{target}.matrix"));
        fs::write(&path, self.to_text()).map_err(|source| MatrixError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Incremental matrix construction.
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    goal_count: usize,
    rows: Vec<Vec<bool>>,
}

impl MatrixBuilder {
    /// Builder for `goal_count` goal columns.
    pub fn new(goal_count: usize) -> Self {
        Self {
            goal_count,
            rows: Vec::new(),
        }
    }

    /// Append one test row. `covered` is padded or truncated to the goal count.
    pub fn push_row(&mut self, covered: &[bool], passed: bool) {
        let mut row = Vec::with_capacity(self.goal_count + 1);
        row.extend((0..self.goal_count).map(|i| covered.get(i).copied().unwrap_or(false)));
        row.push(passed);
        self.rows.push(row);
    }

    /// Freeze.
    pub fn build(self) -> CoverageMatrix {
        CoverageMatrix {
            goal_count: self.goal_count,
            rows: self.rows,
        }
    }
}
