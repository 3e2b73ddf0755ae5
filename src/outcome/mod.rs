//! Normalized test outcomes.

pub mod builder;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::trace::ExecutionTrace;

/// Pseudo-method name the frameworks report for class-level failures.
pub const INITIALIZATION_ERROR: &str = "initializationError";

/// Which test an outcome or failure belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestIdentity {
    /// Test class.
    pub class_name: String,
    /// Test method. `None` means class-level scaffolding.
    pub method_name: Option<String>,
}

impl TestIdentity {
    /// Identity of one test method.
    pub fn method(class_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: Some(method_name.into()),
        }
    }

    /// Identity of a whole class or its scaffolding.
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: None,
        }
    }

    /// Whether failures under this identity cannot be blamed on one test.
    pub fn is_scaffolding_identifier(&self) -> bool {
        is_scaffolding_method(self.method_name.as_deref())
    }
}

/// Absent method names and `initializationError` denote scaffolding.
pub fn is_scaffolding_method(method_name: Option<&str>) -> bool {
    match method_name {
        None => true,
        Some(name) => name == INITIALIZATION_ERROR,
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method_name {
            Some(method) => write!(f, "{}#{}", self.class_name, method),
            None => write!(f, "{}", self.class_name),
        }
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Thrown exception type.
    pub exception_class: String,
    /// Exception message.
    #[serde(default)]
    pub message: Option<String>,
    /// Failing method, absent for class-level failures.
    #[serde(default)]
    pub method_name: Option<String>,
    /// Whether the exception is an assertion failure.
    #[serde(default)]
    pub is_assertion_error: bool,
    /// Stack frames, innermost first.
    #[serde(default)]
    pub stack_trace: Vec<String>,
}

impl Failure {
    /// `<class>: <message>` followed by one `\tat <frame>` line per frame.
    pub fn trace_text(&self) -> String {
        let mut text = match &self.message {
            Some(message) => format!("{}: {}", self.exception_class, message),
            None => self.exception_class.clone(),
        };
        for frame in &self.stack_trace {
            text.push_str("\n\tat ");
            text.push_str(frame);
        }
        text
    }
}

/// Result of executing one test method, or an aggregate over many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Which test ran.
    pub identity: TestIdentity,
    /// No failure was reported.
    pub successful: bool,
    /// Wall-clock runtime.
    pub runtime: Duration,
    /// Trace text of the last failure.
    pub trace_text: String,
    /// Reported failures, in report order.
    pub failures: Vec<Failure>,
    /// Tests started.
    pub run_count: usize,
    /// Failures reported.
    pub failure_count: usize,
    /// What the execution touched.
    pub execution_trace: Option<ExecutionTrace>,
}

impl TestOutcome {
    /// Fresh successful outcome with nothing recorded yet.
    pub fn new(identity: TestIdentity) -> Self {
        Self {
            identity,
            successful: true,
            runtime: Duration::ZERO,
            trace_text: String::new(),
            failures: Vec::new(),
            run_count: 0,
            failure_count: 0,
            execution_trace: None,
        }
    }

    pub(crate) fn record_failure(&mut self, failure: Failure) {
        self.successful = false;
        self.trace_text = failure.trace_text();
        self.failures.push(failure);
        self.failure_count += 1;
    }

    pub(crate) fn record_finish(&mut self, runtime: Duration, trace: ExecutionTrace) {
        self.runtime = runtime;
        self.execution_trace = Some(trace);
        self.run_count += 1;
    }

    /// Test class name.
    pub fn class_name(&self) -> &str {
        &self.identity.class_name
    }

    /// Test method name, if attributable.
    pub fn method_name(&self) -> Option<&str> {
        self.identity.method_name.as_deref()
    }

    /// Trace snapshot, empty if none was captured.
    pub fn trace(&self) -> ExecutionTrace {
        self.execution_trace.clone().unwrap_or_default()
    }
}
