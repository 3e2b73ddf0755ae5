//! Coverage goals and their factories.

use std::fmt;

use crate::classes::ManifestIndex;
use crate::mutant::{Mutant, MutantId};
use crate::trace::ExecutionTrace;

use super::criterion::Criterion;

/// One unit of required coverage.
///
/// `is_covered` must be a pure query against the trace.
pub trait CoverageGoal: fmt::Debug {
    /// Stable human-readable name, also the sort key.
    fn describe(&self) -> String;

    /// Whether `trace` satisfies the goal.
    fn is_covered(&self, trace: &ExecutionTrace) -> bool;

    /// Mutant behind the goal, for mutation criteria.
    fn mutant(&self) -> Option<MutantId> {
        None
    }
}

/// One edge of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchGoal {
    /// Owning class.
    pub class_name: String,
    /// Instrumentation id.
    pub branch_id: u32,
    /// Edge: `true` or `false`.
    pub value: bool,
}

impl CoverageGoal for BranchGoal {
    fn describe(&self) -> String {
        format!("{} branch {} {}", self.class_name, self.branch_id, self.value)
    }

    fn is_covered(&self, trace: &ExecutionTrace) -> bool {
        trace.covers_branch(self.branch_id, self.value)
    }
}

/// One source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineGoal {
    /// Owning class.
    pub class_name: String,
    /// Line number.
    pub line: u32,
}

impl CoverageGoal for LineGoal {
    fn describe(&self) -> String {
        format!("{} line {:05}", self.class_name, self.line)
    }

    fn is_covered(&self, trace: &ExecutionTrace) -> bool {
        trace.covers_line(&self.class_name, self.line)
    }
}

/// Entry of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodGoal {
    /// Owning class.
    pub class_name: String,
    /// Simple method name.
    pub method_name: String,
}

impl CoverageGoal for MethodGoal {
    fn describe(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    fn is_covered(&self, trace: &ExecutionTrace) -> bool {
        trace
            .methods
            .contains(&format!("{}.{}", self.class_name, self.method_name))
    }
}

/// A mutant. Covered by a trace once it is touched; whether it is killed is
/// decided by re-running the test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationGoal {
    /// Target mutant.
    pub mutant: Mutant,
}

impl CoverageGoal for MutationGoal {
    fn describe(&self) -> String {
        self.mutant.to_string()
    }

    fn is_covered(&self, trace: &ExecutionTrace) -> bool {
        trace.touched_mutants.contains(&self.mutant.id)
    }

    fn mutant(&self) -> Option<MutantId> {
        Some(self.mutant.id)
    }
}

/// Produces the goals of one criterion for one target class.
pub trait GoalFactory {
    /// Goals in any order; the analyzer sorts them.
    fn goals(&self, target: &str, criterion: Criterion) -> Vec<Box<dyn CoverageGoal>>;
}

/// Goals for every mutant of `target` in the pool order.
pub fn mutation_goals<'a>(
    target: &str,
    mutants: impl IntoIterator<Item = &'a Mutant>,
) -> Vec<Box<dyn CoverageGoal>> {
    mutants
        .into_iter()
        .filter(|m| m.class_name == target)
        .map(|m| Box::new(MutationGoal { mutant: m.clone() }) as Box<dyn CoverageGoal>)
        .collect()
}

/// Sort goals by their description.
pub fn sort_goals(goals: &mut [Box<dyn CoverageGoal>]) {
    goals.sort_by_cached_key(|g| g.describe());
}

/// Goal factory reading the instrumentation manifest.
#[derive(Debug, Clone)]
pub struct ManifestGoalFactory {
    index: ManifestIndex,
}

impl ManifestGoalFactory {
    /// Factory over `index`.
    pub fn new(index: ManifestIndex) -> Self {
        Self { index }
    }
}

impl GoalFactory for ManifestGoalFactory {
    fn goals(&self, target: &str, criterion: Criterion) -> Vec<Box<dyn CoverageGoal>> {
        let Some(entry) = self.index.entry(target) else {
            return Vec::new();
        };
        let class_name = entry.class.name.clone();
        let branches = || {
            let mut goals: Vec<Box<dyn CoverageGoal>> =
                Vec::with_capacity(entry.branches.len() * 2);
            for &branch_id in &entry.branches {
                for value in [true, false] {
                    goals.push(Box::new(BranchGoal {
                        class_name: class_name.clone(),
                        branch_id,
                        value,
                    }));
                }
            }
            goals
        };
        let methods = |names: &[String]| {
            names
                .iter()
                .map(|m| {
                    Box::new(MethodGoal {
                        class_name: class_name.clone(),
                        method_name: m.clone(),
                    }) as Box<dyn CoverageGoal>
                })
                .collect::<Vec<_>>()
        };

        match criterion {
            Criterion::Branch => {
                let mut goals = branches();
                goals.extend(methods(&entry.branchless_methods));
                goals
            }
            Criterion::OnlyBranch => branches(),
            Criterion::Line => entry
                .lines
                .iter()
                .map(|&line| {
                    Box::new(LineGoal {
                        class_name: class_name.clone(),
                        line,
                    }) as Box<dyn CoverageGoal>
                })
                .collect(),
            Criterion::Method => methods(&entry.instrumented_methods),
            Criterion::WeakMutation
            | Criterion::StrongMutation
            | Criterion::Mutation
            | Criterion::OnlyMutation => mutation_goals(target, &self.index.manifest().mutants),
        }
    }
}
