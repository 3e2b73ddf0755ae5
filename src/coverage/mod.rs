//! Coverage analysis of existing tests: goals, discovery, matrix and report.

pub mod analyzer;
pub mod criterion;
pub mod discovery;
pub mod goals;
pub mod matrix;
pub mod report;

pub use analyzer::{CoverageAnalyzer, coverage_of, covered_goals};
pub use criterion::Criterion;
pub use discovery::{TestOrdering, discover_tests, order_tests, resolve_targets};
pub use goals::{
    BranchGoal, CoverageGoal, GoalFactory, LineGoal, ManifestGoalFactory, MethodGoal,
    MutationGoal,
};
pub use matrix::{CoverageMatrix, MatrixBuilder, MatrixError};
pub use report::{
    CoverageReport, CriterionCoverage, GoalReport, ReportFormat, TargetCoverage, render_report,
};
