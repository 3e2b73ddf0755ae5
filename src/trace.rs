//! Execution traces recorded by the instrumentation layer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::mutant::MutantId;

/// Record of what one test execution touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// Branch ids whose `true` edge was taken.
    #[serde(default)]
    pub true_branches: BTreeSet<u32>,
    /// Branch ids whose `false` edge was taken.
    #[serde(default)]
    pub false_branches: BTreeSet<u32>,
    /// Covered line numbers, keyed by class name.
    #[serde(default)]
    pub lines: BTreeMap<String, BTreeSet<u32>>,
    /// Entered methods as `Class.method`.
    #[serde(default)]
    pub methods: BTreeSet<String>,
    /// Type of the exception explicitly thrown by the code under test, if any.
    #[serde(default)]
    pub explicit_exception: Option<String>,
    /// Mutants whose code location was executed.
    #[serde(default)]
    pub touched_mutants: BTreeSet<MutantId>,
}

/// Partial trace emitted while a test is running.
///
/// Fragments are merged into the collector of the current
/// [`ExecutionContext`](crate::context::ExecutionContext).
pub type TraceFragment = ExecutionTrace;

impl ExecutionTrace {
    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.true_branches.is_empty()
            && self.false_branches.is_empty()
            && self.lines.values().all(BTreeSet::is_empty)
            && self.methods.is_empty()
            && self.explicit_exception.is_none()
            && self.touched_mutants.is_empty()
    }

    /// Fold a fragment into this trace.
    pub fn merge(&mut self, fragment: TraceFragment) {
        self.true_branches.extend(fragment.true_branches);
        self.false_branches.extend(fragment.false_branches);
        for (class, lines) in fragment.lines {
            self.lines.entry(class).or_default().extend(lines);
        }
        self.methods.extend(fragment.methods);
        if fragment.explicit_exception.is_some() {
            self.explicit_exception = fragment.explicit_exception;
        }
        self.touched_mutants.extend(fragment.touched_mutants);
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether the given branch edge was taken.
    pub fn covers_branch(&self, branch_id: u32, value: bool) -> bool {
        if value {
            self.true_branches.contains(&branch_id)
        } else {
            self.false_branches.contains(&branch_id)
        }
    }

    /// Whether the given line of `class` was executed.
    pub fn covers_line(&self, class: &str, line: u32) -> bool {
        self.lines
            .get(class)
            .is_some_and(|lines| lines.contains(&line))
    }

    /// All covered `(class, line)` pairs.
    pub fn covered_lines(&self) -> BTreeSet<(String, u32)> {
        self.lines
            .iter()
            .flat_map(|(class, lines)| lines.iter().map(move |line| (class.clone(), *line)))
            .collect()
    }
}
