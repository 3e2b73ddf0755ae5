//! Conversion of framework-native results into [`TestOutcome`]s.
//!
//! Everything here is a pure function; listeners feed it raw results and
//! orchestration code only ever sees the normalized shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Failure, TestIdentity, TestOutcome};
use crate::trace::ExecutionTrace;

/// Root of the assertion-failure hierarchy.
pub const ASSERTION_ERROR: &str = "java.lang.AssertionError";

/// A failure as reported by a test framework.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeFailure {
    /// Thrown exception type.
    pub exception_class: String,
    /// Superclasses of the exception type, nearest first.
    #[serde(default)]
    pub hierarchy: Vec<String>,
    /// Exception message.
    #[serde(default)]
    pub message: Option<String>,
    /// Method of the failing description, absent for class-level failures.
    #[serde(default)]
    pub method_name: Option<String>,
    /// Stack frames, innermost first.
    #[serde(default)]
    pub stack_trace: Vec<String>,
}

/// Class-level summary reported by a JUnit 4 style runner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeResult {
    /// Class that ran.
    pub class_name: String,
    /// Tests started.
    pub run_count: usize,
    /// Failures reported.
    pub failure_count: usize,
    /// Reported failures.
    pub failures: Vec<NativeFailure>,
    /// Total runtime.
    pub runtime: Duration,
}

/// Node of a JUnit 5 style test plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestIdentifier {
    /// Unique id inside the plan.
    pub unique_id: String,
    /// Display name; for methods usually `name()`.
    pub display_name: String,
    /// Owning class.
    pub class_name: String,
    /// A test leaf, as opposed to a container.
    #[serde(default)]
    pub is_test: bool,
}

/// Terminal status of a test plan node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestExecutionResult {
    /// Completed without failure.
    Successful,
    /// Skipped by an assumption; not a failure.
    Aborted {
        /// Reason, if one was reported.
        #[serde(default)]
        reason: Option<NativeFailure>,
    },
    /// Completed with a failure.
    Failed {
        /// What was thrown.
        failure: NativeFailure,
    },
}

/// Whether the exception type hierarchy denotes an assertion failure.
pub fn is_assertion_failure(hierarchy: &[String]) -> bool {
    hierarchy.iter().any(|class| class == ASSERTION_ERROR)
}

/// Normalize one failure.
pub fn build_failure(native: &NativeFailure) -> Failure {
    let mut types = Vec::with_capacity(native.hierarchy.len() + 1);
    types.push(native.exception_class.clone());
    types.extend(native.hierarchy.iter().cloned());
    Failure {
        exception_class: native.exception_class.clone(),
        message: native.message.clone(),
        method_name: native.method_name.clone(),
        is_assertion_error: is_assertion_failure(&types),
        stack_trace: native.stack_trace.clone(),
    }
}

/// Normalize a class-level JUnit 4 result.
pub fn build(native: &NativeResult) -> TestOutcome {
    let failures: Vec<Failure> = native.failures.iter().map(build_failure).collect();
    TestOutcome {
        identity: TestIdentity::class(native.class_name.clone()),
        successful: failures.is_empty() && native.failure_count == 0,
        runtime: native.runtime,
        trace_text: failures.last().map(Failure::trace_text).unwrap_or_default(),
        failures,
        run_count: native.run_count,
        failure_count: native.failure_count,
        execution_trace: None,
    }
}

/// Method name from a display name, `testPositive()` becomes `testPositive`.
pub fn method_from_display_name(display_name: &str) -> &str {
    display_name.strip_suffix("()").unwrap_or(display_name)
}

/// Reduce JUnit 5 style results to one outcome per test leaf.
///
/// A failed container yields a scaffolding outcome with no run and one
/// failure. Successful or aborted containers yield nothing.
pub fn build_platform(results: &[(TestIdentifier, TestExecutionResult)]) -> Vec<TestOutcome> {
    let mut outcomes = Vec::new();
    for (identifier, result) in results {
        if identifier.is_test {
            let mut outcome = TestOutcome::new(TestIdentity::method(
                identifier.class_name.clone(),
                method_from_display_name(&identifier.display_name),
            ));
            outcome.run_count = 1;
            if let TestExecutionResult::Failed { failure } = result {
                let mut failure = build_failure(failure);
                if failure.method_name.is_none() {
                    failure.method_name = outcome.identity.method_name.clone();
                }
                outcome.record_failure(failure);
            }
            outcomes.push(outcome);
        } else if let TestExecutionResult::Failed { failure } = result {
            let mut outcome = TestOutcome::new(TestIdentity::class(identifier.class_name.clone()));
            let mut failure = build_failure(failure);
            failure.method_name = None;
            outcome.record_failure(failure);
            outcomes.push(outcome);
        }
    }
    outcomes
}

/// Suite-level view over many outcomes.
pub fn aggregate(outcomes: &[TestOutcome]) -> TestOutcome {
    let class_name = outcomes
        .first()
        .map(|o| o.identity.class_name.clone())
        .unwrap_or_default();
    let mut total = TestOutcome::new(TestIdentity::class(class_name));
    let mut trace = ExecutionTrace::default();
    let mut any_trace = false;
    for outcome in outcomes {
        total.successful &= outcome.successful;
        total.runtime += outcome.runtime;
        total.run_count += outcome.run_count;
        total.failure_count += outcome.failure_count;
        total.failures.extend(outcome.failures.iter().cloned());
        if !outcome.trace_text.is_empty() {
            total.trace_text = outcome.trace_text.clone();
        }
        if let Some(t) = &outcome.execution_trace {
            trace.merge(t.clone());
            any_trace = true;
        }
    }
    if any_trace {
        total.execution_trace = Some(trace);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(exception: &str, hierarchy: &[&str], method: Option<&str>) -> NativeFailure {
        NativeFailure {
            exception_class: exception.to_string(),
            hierarchy: hierarchy.iter().map(|s| s.to_string()).collect(),
            message: Some("boom".to_string()),
            method_name: method.map(str::to_string),
            stack_trace: Vec::new(),
        }
    }

    #[test]
    fn assertion_subclasses_are_assertion_failures() {
        let comparison = build_failure(&native(
            "org.junit.ComparisonFailure",
            &["java.lang.AssertionError", "java.lang.Error", "java.lang.Throwable"],
            Some("t"),
        ));
        assert!(comparison.is_assertion_error);

        let direct = build_failure(&native("java.lang.AssertionError", &[], Some("t")));
        assert!(direct.is_assertion_error);

        let npe = build_failure(&native(
            "java.lang.NullPointerException",
            &["java.lang.RuntimeException", "java.lang.Exception"],
            Some("t"),
        ));
        assert!(!npe.is_assertion_error);
    }

    #[test]
    fn build_copies_counts_and_failures() {
        let outcome = build(&NativeResult {
            class_name: "FooTest".to_string(),
            run_count: 3,
            failure_count: 1,
            failures: vec![native("java.lang.IllegalStateException", &[], None)],
            runtime: Duration::from_millis(5),
        });
        assert!(!outcome.successful);
        assert_eq!(outcome.run_count, 3);
        assert_eq!(outcome.failure_count, 1);
        assert!(outcome.failures[0].method_name.is_none());
        assert_eq!(outcome.trace_text, "java.lang.IllegalStateException: boom");
    }

    #[test]
    fn platform_reduction_strips_parens_and_maps_containers() {
        let results = vec![
            (
                TestIdentifier {
                    unique_id: "[class:FooTest]".to_string(),
                    display_name: "FooTest".to_string(),
                    class_name: "FooTest".to_string(),
                    is_test: false,
                },
                TestExecutionResult::Failed {
                    failure: native("java.lang.ExceptionInInitializerError", &[], None),
                },
            ),
            (
                TestIdentifier {
                    unique_id: "[method:ok()]".to_string(),
                    display_name: "ok()".to_string(),
                    class_name: "FooTest".to_string(),
                    is_test: true,
                },
                TestExecutionResult::Successful,
            ),
            (
                TestIdentifier {
                    unique_id: "[method:skipped()]".to_string(),
                    display_name: "skipped()".to_string(),
                    class_name: "FooTest".to_string(),
                    is_test: true,
                },
                TestExecutionResult::Aborted { reason: None },
            ),
        ];
        let outcomes = build_platform(&results);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].identity.is_scaffolding_identifier());
        assert_eq!(outcomes[0].run_count, 0);
        assert_eq!(outcomes[0].failure_count, 1);
        assert_eq!(outcomes[1].method_name(), Some("ok"));
        assert!(outcomes[1].successful);
        assert!(outcomes[2].successful);
    }

    #[test]
    fn aggregate_sums_counts_and_merges_traces() {
        let mut a = TestOutcome::new(TestIdentity::method("S", "a"));
        a.run_count = 1;
        let mut trace = ExecutionTrace::default();
        trace.true_branches.insert(1);
        a.execution_trace = Some(trace);
        let mut b = TestOutcome::new(TestIdentity::method("S", "b"));
        b.run_count = 1;
        b.record_failure(build_failure(&native("java.lang.AssertionError", &[], Some("b"))));

        let total = aggregate(&[a, b]);
        assert!(!total.successful);
        assert_eq!(total.run_count, 2);
        assert_eq!(total.failure_count, 1);
        assert_eq!(total.failures.len(), 1);
        assert!(total.trace().covers_branch(1, true));
        assert!(total.identity.method_name.is_none());
    }
}
