use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::criterion::Criterion;
use super::matrix::CoverageMatrix;
use crate::outcome::TestIdentity;

/// Supported output formats for coverage reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown summary.
    Markdown,
    /// JSON summary with every goal inline.
    Json,
}

/// Per-goal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalReport {
    /// Goal description.
    pub goal: String,
    /// First test that covered the goal.
    pub covered_by: Option<TestIdentity>,
}

/// Result of one criterion for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionCoverage {
    /// Criterion.
    pub criterion: Criterion,
    /// Number of goals.
    pub total_goals: usize,
    /// Number of covered goals.
    pub covered_goals: usize,
    /// Covered / total, 1.0 without goals.
    pub coverage: f64,
    /// One `0`/`1` per goal, `"1"` without goals.
    pub bit_string: String,
    /// Goals in analysis order.
    pub goals: Vec<GoalReport>,
    /// Test by goal coverage.
    #[serde(skip)]
    pub matrix: CoverageMatrix,
}

/// Result for one target class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCoverage {
    /// Target class.
    pub target: String,
    /// Per-criterion results, in requested order.
    pub criteria: Vec<CriterionCoverage>,
    /// Goals over all criteria.
    pub total_goals: usize,
    /// Covered goals over all criteria.
    pub covered_goals: usize,
    /// Covered / total, 1.0 without goals.
    pub coverage: f64,
    /// Concatenated bit-strings.
    pub bit_string: String,
    /// Tests covering at least one goal.
    pub minimized_size: usize,
    /// Where the matrix was written.
    pub matrix_path: Option<PathBuf>,
}

/// Outcome of a coverage analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    /// Per-target results.
    pub targets: Vec<TargetCoverage>,
    /// Executed test classes.
    pub test_classes: Vec<String>,
    /// Executed tests.
    pub tests_executed: usize,
    /// Distinct exception types thrown explicitly by the code under test.
    pub explicit_exceptions: BTreeSet<String>,
    /// Analysis wall time.
    pub total_time: Duration,
}

impl CoverageReport {
    /// Report of a run that analyzed nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if no target was analyzed.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Result for `target`.
    pub fn target(&self, target: &str) -> Option<&TargetCoverage> {
        self.targets.iter().find(|t| t.target == target)
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

/// Render a report in `format`.
pub fn render_report(report: &CoverageReport, format: ReportFormat) -> String {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "tests_executed": report.tests_executed,
            "test_classes": report.test_classes,
            "explicit_exceptions": report.explicit_exceptions,
            "total_time_ms": u64::try_from(report.total_time.as_millis()).unwrap_or(u64::MAX),
            "targets": report.targets,
        }))
        .unwrap_or_else(|err| format!("{{\"error\":\"{err}\"}}")),
        ReportFormat::Markdown => {
            let mut out = String::from("# Coverage Analysis\n\n");
            out.push_str(&format!(
                "- tests executed: {}\n- test classes: {}\n- explicit exception types: {}\n- total time: {} ms\n",
                report.tests_executed,
                report.test_classes.len(),
                report.explicit_exceptions.len(),
                report.total_time.as_millis()
            ));

            if report.targets.is_empty() {
                out.push_str("\nNo target class was analyzed.\n");
                return out;
            }

            for target in &report.targets {
                out.push_str(&format!("\n## {}\n\n", target.target));
                out.push_str("| criterion | covered | total | coverage | bits |\n");
                out.push_str("|---|---:|---:|---:|---|\n");
                for c in &target.criteria {
                    out.push_str(&format!(
                        "| {} | {} | {} | {} | `{}` |\n",
                        c.criterion,
                        c.covered_goals,
                        c.total_goals,
                        percent(c.coverage),
                        c.bit_string
                    ));
                }
                out.push_str(&format!(
                    "| **total** | {} | {} | {} | `{}` |\n",
                    target.covered_goals,
                    target.total_goals,
                    percent(target.coverage),
                    target.bit_string
                ));
                out.push_str(&format!("\n- minimized size: {}\n", target.minimized_size));
                if let Some(path) = &target.matrix_path {
                    out.push_str(&format!("- matrix: {}\n", path.display()));
                }

                let uncovered: Vec<&str> = target
                    .criteria
                    .iter()
                    .flat_map(|c| c.goals.iter())
                    .filter(|g| g.covered_by.is_none())
                    .map(|g| g.goal.as_str())
                    .collect();
                if !uncovered.is_empty() {
                    out.push_str("\n### Uncovered goals\n\n");
                    for goal in uncovered {
                        out.push_str(&format!("- {goal}\n"));
                    }
                }
            }
            out
        }
    }
}
