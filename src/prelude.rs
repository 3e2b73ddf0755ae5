//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use suite_oracle::prelude::*;
//! ```

pub use crate::budget::{Deadline, TimeBudget, Unlimited};
pub use crate::classes::{ClassIndex, ManifestIndex, TestClass, is_test_class};
pub use crate::config::OracleConfig;
pub use crate::context::{ExecutionContext, LoaderHandle, ManagedSandbox, Sandbox};
pub use crate::coverage::{
    CoverageAnalyzer, CoverageReport, Criterion, ManifestGoalFactory, ReportFormat, render_report,
};
pub use crate::outcome::{Failure, TestIdentity, TestOutcome};
pub use crate::runner::junit4::Junit4Backend;
pub use crate::runner::junit5::Junit5Backend;
pub use crate::runner::mutation::MutationAwareRunner;
pub use crate::runner::process::ProcessLauncher;
pub use crate::runner::{TestExecutionBackend, TestFormat};
pub use crate::stats::{JsonlStatisticsSink, StatisticsSink};
pub use crate::validate::{CandidateTest, StabilityValidator};
