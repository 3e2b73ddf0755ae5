//! Test execution backends.
//!
//! Orchestration code talks to [`TestExecutionBackend`] only. The two
//! framework generations are hidden behind [`junit4::Junit4Backend`] and
//! [`junit5::Junit5Backend`], both of which can be driven by the external
//! launcher process in [`process`].

pub mod junit4;
pub mod junit5;
pub mod mutation;
pub mod process;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::classes::TestClass;
use crate::context::ExecutionContext;
use crate::outcome::TestOutcome;
use crate::outcome::builder::{NativeFailure, TestExecutionResult, TestIdentifier};
use crate::trace::TraceFragment;

/// Runner errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Nothing to run.
    #[error("no test classes to execute")]
    NoClasses,
    /// Launcher program could not be started.
    #[error("failed to spawn launcher `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Launcher ran but reported a fatal problem.
    #[error("launcher failed: {0}")]
    Launcher(String),
    /// No outcome was reported for the requested method.
    #[error("no outcome reported for {class}#{method}")]
    MissingOutcome {
        /// Test class.
        class: String,
        /// Requested method.
        method: String,
    },
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Framework generation a backend speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFormat {
    /// JUnit 4 style runner.
    #[default]
    Junit4,
    /// JUnit 5 platform launcher.
    Junit5,
}

impl TestFormat {
    /// Launcher command-line value.
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Junit4 => "junit4",
            Self::Junit5 => "junit5",
        }
    }
}

impl fmt::Display for TestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl FromStr for TestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "junit4" | "4" => Ok(Self::Junit4),
            "junit5" | "5" => Ok(Self::Junit5),
            other => Err(format!("unknown test format: {other}")),
        }
    }
}

/// One event of a launcher's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A test method started.
    TestStarted {
        /// Test class.
        class_name: String,
        /// Test method.
        #[serde(default)]
        method_name: Option<String>,
        /// Plan node id, JUnit 5 only.
        #[serde(default)]
        unique_id: Option<String>,
    },
    /// Instrumentation data recorded while the current test runs.
    Trace {
        /// Recorded data.
        fragment: TraceFragment,
    },
    /// A failure was reported, JUnit 4 only.
    TestFailure {
        /// Class of the failing description.
        class_name: String,
        /// Failure details.
        failure: NativeFailure,
    },
    /// A test method finished, JUnit 4 only.
    TestFinished {
        /// Test class.
        class_name: String,
        /// Test method.
        #[serde(default)]
        method_name: Option<String>,
    },
    /// A plan node finished, JUnit 5 only.
    ExecutionFinished {
        /// Finished node.
        identifier: TestIdentifier,
        /// Its status.
        result: TestExecutionResult,
    },
    /// The whole class finished.
    RunFinished {
        /// Class that ran.
        class_name: String,
        /// Tests started.
        #[serde(default)]
        run_count: usize,
        /// Failures reported.
        #[serde(default)]
        failure_count: usize,
    },
}

/// Receives the event stream of one class execution.
pub trait RunListener {
    /// Handle one event.
    fn on_event(&mut self, ctx: &mut ExecutionContext, event: RunEvent);
}

/// Framework-neutral test execution.
pub trait TestExecutionBackend {
    /// Execute every test of `classes`, in order. Outcomes are in execution order.
    fn run(
        &mut self,
        ctx: &mut ExecutionContext,
        classes: &[TestClass],
    ) -> Result<Vec<TestOutcome>, RunnerError>;

    /// Execute a single test method.
    fn run_method(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: &str,
    ) -> Result<TestOutcome, RunnerError>;
}

impl<B: TestExecutionBackend + ?Sized> TestExecutionBackend for Box<B> {
    fn run(
        &mut self,
        ctx: &mut ExecutionContext,
        classes: &[TestClass],
    ) -> Result<Vec<TestOutcome>, RunnerError> {
        (**self).run(ctx, classes)
    }

    fn run_method(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: &str,
    ) -> Result<TestOutcome, RunnerError> {
        (**self).run_method(ctx, class, method)
    }
}

/// Shared execution bracket for both backends.
///
/// Brackets the run with an execution scope, enables the trace collector,
/// and for each class clears the trace and installs the class's loader as
/// context loader before handing over to `run_class`.
///
/// A class that fails to run is logged and skipped; the outcomes of the
/// other classes are kept. Only when no class ran at all is the first
/// error returned.
pub(crate) fn run_bracketed<F>(
    ctx: &mut ExecutionContext,
    classes: &[TestClass],
    mut run_class: F,
) -> Result<Vec<TestOutcome>, RunnerError>
where
    F: FnMut(&mut ExecutionContext, &TestClass) -> Result<Vec<TestOutcome>, RunnerError>,
{
    if classes.is_empty() {
        return Err(RunnerError::NoClasses);
    }
    let mut scope = ctx.execution_scope();
    scope.enable_trace();
    let mut outcomes = Vec::new();
    let mut first_error = None;
    let mut ran = 0usize;
    for class in classes {
        scope.clear_trace();
        let loader = class
            .loader
            .clone()
            .unwrap_or_else(|| scope.sut_loader().clone());
        let mut guard = scope.with_context_loader(loader);
        match run_class(&mut *guard, class) {
            Ok(class_outcomes) => {
                ran += 1;
                outcomes.extend(class_outcomes);
            }
            Err(err) => {
                warn!(class = %class.name, error = %err, "failed to execute test class");
                first_error.get_or_insert(err);
            }
        }
    }
    scope.disable_trace();
    match first_error {
        Some(err) if ran == 0 => Err(err),
        _ => Ok(outcomes),
    }
}

/// Pick the outcome of `method` from a filtered class run.
///
/// A scaffolding outcome stands in when the method never ran.
pub(crate) fn select_method_outcome(
    class: &TestClass,
    method: &str,
    outcomes: Vec<TestOutcome>,
) -> Result<TestOutcome, RunnerError> {
    let mut scaffolding = None;
    for outcome in outcomes {
        if outcome.method_name() == Some(method) {
            return Ok(outcome);
        }
        if scaffolding.is_none() && outcome.identity.is_scaffolding_identifier() {
            scaffolding = Some(outcome);
        }
    }
    scaffolding.ok_or_else(|| RunnerError::MissingOutcome {
        class: class.name.clone(),
        method: method.to_string(),
    })
}
