//! Classification of failures observed while validating candidates.
//!
//! [`classify`] maps one failure to an [`ObservedOutcome`]; [`decide`] maps
//! that to what happens to the candidate pool. Both are pure.

use serde::{Deserialize, Serialize};

use super::CandidateTest;
use crate::outcome::{Failure, INITIALIZATION_ERROR};

/// Message of the instrumentation agent failing to attach.
pub const AGENT_ATTACH_FAILURE: &str = "Failed to attach Java Agent";

/// What a failure says about the candidate it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedOutcome {
    /// No failure.
    Pass,
    /// The candidate was expected to fail.
    ExpectedFailure,
    /// The environment, not the suite, is broken.
    KnownEnvironmentFlake,
    /// Shared setup or teardown failed; no single test is to blame.
    ScaffoldingFailure(String),
    /// An assertion of the candidate failed.
    AssertionFailure,
    /// The candidate threw something other than an assertion failure.
    OtherFailure,
    /// The failing method matches no candidate.
    UnknownTest,
}

/// Consequence for the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Keep as is.
    KeepStable,
    /// Leave the pool untouched.
    Ignore,
    /// Drop every candidate of the round.
    DiscardAll,
    /// Keep but mark unstable.
    KeepUnstable,
    /// Drop the candidate.
    Discard,
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    /// Compiled and passed.
    KeptStable,
    /// Compiled, assertion failed; kept with the unstable flag.
    KeptUnstable,
    /// Did not compile or threw.
    Discarded,
    /// Removed together with the whole pool.
    AllDiscarded,
}

/// Classify `failure` against the candidates it may belong to.
pub fn classify(failure: &Failure, candidates: &[CandidateTest]) -> ObservedOutcome {
    let Some(method) = failure.method_name.as_deref() else {
        return ObservedOutcome::ScaffoldingFailure(failure.trace_text());
    };
    let candidate = candidates.iter().find(|c| c.name == method);
    if candidate.is_some_and(|c| c.expected_failing) {
        return ObservedOutcome::ExpectedFailure;
    }
    if method == INITIALIZATION_ERROR {
        let message = failure.message.as_deref().unwrap_or_default();
        if message.contains(AGENT_ATTACH_FAILURE) {
            return ObservedOutcome::KnownEnvironmentFlake;
        }
        return ObservedOutcome::ScaffoldingFailure(failure.trace_text());
    }
    match candidate {
        None => ObservedOutcome::UnknownTest,
        Some(_) if failure.is_assertion_error => ObservedOutcome::AssertionFailure,
        Some(_) => ObservedOutcome::OtherFailure,
    }
}

/// What to do about an observed outcome.
pub fn decide(observed: &ObservedOutcome) -> Decision {
    match observed {
        ObservedOutcome::Pass => Decision::KeepStable,
        ObservedOutcome::ExpectedFailure
        | ObservedOutcome::KnownEnvironmentFlake
        | ObservedOutcome::UnknownTest => Decision::Ignore,
        ObservedOutcome::ScaffoldingFailure(_) => Decision::DiscardAll,
        ObservedOutcome::AssertionFailure => Decision::KeepUnstable,
        ObservedOutcome::OtherFailure => Decision::Discard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(method: Option<&str>, exception: &str, assertion: bool) -> Failure {
        Failure {
            exception_class: exception.to_string(),
            message: Some("boom".to_string()),
            method_name: method.map(str::to_string),
            is_assertion_error: assertion,
            stack_trace: vec!["com.example.FooESTest.test0(FooESTest.java:10)".to_string()],
        }
    }

    fn pool() -> Vec<CandidateTest> {
        vec![
            CandidateTest::new("test0", "a();"),
            CandidateTest::new("test1", "b();").expecting_failure(),
        ]
    }

    #[test]
    fn assertion_failure_keeps_candidate_unstable() {
        let observed = classify(&failure(Some("test0"), "java.lang.AssertionError", true), &pool());
        assert_eq!(observed, ObservedOutcome::AssertionFailure);
        assert_eq!(decide(&observed), Decision::KeepUnstable);
    }

    #[test]
    fn other_exception_discards_candidate() {
        let observed = classify(
            &failure(Some("test0"), "java.lang.NullPointerException", false),
            &pool(),
        );
        assert_eq!(decide(&observed), Decision::Discard);
    }

    #[test]
    fn expected_failures_are_ignored() {
        let observed = classify(
            &failure(Some("test1"), "java.lang.IllegalStateException", false),
            &pool(),
        );
        assert_eq!(observed, ObservedOutcome::ExpectedFailure);
        assert_eq!(decide(&observed), Decision::Ignore);
    }

    #[test]
    fn missing_method_blames_scaffolding() {
        let observed = classify(
            &failure(None, "java.lang.ExceptionInInitializerError", false),
            &pool(),
        );
        match &observed {
            ObservedOutcome::ScaffoldingFailure(reason) => {
                assert!(reason.starts_with("java.lang.ExceptionInInitializerError: boom"));
            }
            other => panic!("expected scaffolding failure, got {other:?}"),
        }
        assert_eq!(decide(&observed), Decision::DiscardAll);
    }

    #[test]
    fn agent_attach_failure_is_an_environment_flake() {
        let mut flake = failure(Some(INITIALIZATION_ERROR), "java.lang.RuntimeException", false);
        flake.message =
            Some("Failed to attach Java Agent: well-known file is not secure".to_string());
        assert_eq!(classify(&flake, &pool()), ObservedOutcome::KnownEnvironmentFlake);

        let other = failure(Some(INITIALIZATION_ERROR), "java.lang.RuntimeException", false);
        assert!(matches!(classify(&other, &pool()), ObservedOutcome::ScaffoldingFailure(_)));
    }

    #[test]
    fn unknown_method_is_ignored() {
        let observed =
            classify(&failure(Some("helper"), "java.lang.AssertionError", true), &pool());
        assert_eq!(observed, ObservedOutcome::UnknownTest);
        assert_eq!(decide(&observed), Decision::Ignore);
        assert_eq!(decide(&ObservedOutcome::Pass), Decision::KeepStable);
    }
}
