//! Validation of generated candidate tests.
//!
//! Candidates are rendered by a [`writer::SuiteWriter`], compiled by a
//! [`compiler::Compiler`] into a scoped temporary directory, loaded and
//! executed, and then kept, flagged unstable, or discarded according to
//! [`classify`].

pub mod classify;
pub mod classpath;
pub mod compiler;
pub mod loader;
pub mod stability;
pub mod tmpdir;
pub mod writer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::classes::ArtifactRole;

pub use classify::{CandidateState, Decision, ObservedOutcome, classify, decide};
pub use compiler::{Compiler, CompilerError, Diagnostic, JavacCompiler};
pub use loader::{LoadError, LoadedSuite, load_suite};
pub use stability::{CompileFilterReport, StabilityReport, StabilityValidator, ValidationError};
pub use tmpdir::ScopedTempDir;
pub use writer::{CommandSuiteWriter, SuiteWriter, WriterError};

static SUITE_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// A generated test that has no oracle yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTest {
    /// Test method name in the rendered suite.
    pub name: String,
    /// Rendered body, opaque to validation.
    pub code: String,
    /// Failure is the expected behavior.
    #[serde(default)]
    pub expected_failing: bool,
    /// Assertions turned out to be non-deterministic.
    #[serde(default)]
    pub unstable: bool,
}

impl CandidateTest {
    /// Candidate with a name and body.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            expected_failing: false,
            unstable: false,
        }
    }

    /// Mark the candidate as expected to fail.
    pub fn expecting_failure(mut self) -> Self {
        self.expected_failing = true;
        self
    }
}

/// A file produced by the writer or the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Fully qualified class name.
    pub class_name: String,
    /// What the class is for.
    pub role: ArtifactRole,
}

/// Fresh suite name `<TargetSimpleName>_<n>_tmp_<suffix>`.
///
/// Names are never reused within a process, so a suite compiled twice is
/// never confused with an earlier one.
pub fn next_suite_name(target_class: &str, suffix: &str) -> String {
    let simple = target_class.rsplit('.').next().unwrap_or(target_class);
    let n = SUITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{simple}_{n}_tmp_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_names_are_unique_and_use_the_simple_name() {
        let first = next_suite_name("com.example.Foo", "ESTest");
        let second = next_suite_name("com.example.Foo", "ESTest");
        assert!(first.starts_with("Foo_"));
        assert!(first.ends_with("_tmp_ESTest"));
        assert_ne!(first, second);
    }

    #[test]
    fn candidate_json_defaults_flags() {
        let test: CandidateTest =
            serde_json::from_str(r#"{"name":"test0","code":"foo();"}"#)
                .expect("candidate should parse");
        assert_eq!(test, CandidateTest::new("test0", "foo();"));
    }
}
