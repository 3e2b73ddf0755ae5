//! Per-method mutation analysis.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{RunnerError, TestExecutionBackend};
use crate::classes::TestClass;
use crate::context::ExecutionContext;
use crate::mutant::MutantId;
use crate::outcome::TestIdentity;

/// What happened to the mutants one test method touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationRunRecord {
    /// Test method.
    pub test: TestIdentity,
    /// Pass/fail of the unmutated run.
    pub baseline_successful: bool,
    /// Mutants touched by the unmutated run.
    pub touched: Vec<MutantId>,
    /// Mutants this method killed.
    pub killed: Vec<MutantId>,
    /// Touched mutants already killed by an earlier method.
    pub skipped: Vec<MutantId>,
}

/// Runs each test method against every live mutant it touches.
///
/// `live` and `killed` are disjoint and their union is the mutant set given
/// at construction for the whole lifetime of the runner.
#[derive(Debug, Clone, Default)]
pub struct MutationAwareRunner {
    live: BTreeSet<MutantId>,
    killed: BTreeSet<MutantId>,
    executions: BTreeMap<MutantId, usize>,
}

impl MutationAwareRunner {
    /// Runner tracking `mutants`, all initially live.
    pub fn new(mutants: impl IntoIterator<Item = MutantId>) -> Self {
        Self {
            live: mutants.into_iter().collect(),
            killed: BTreeSet::new(),
            executions: BTreeMap::new(),
        }
    }

    /// Mutants no test has killed yet.
    pub fn live(&self) -> &BTreeSet<MutantId> {
        &self.live
    }

    /// Mutants confirmed killed.
    pub fn killed(&self) -> &BTreeSet<MutantId> {
        &self.killed
    }

    /// How often `id` was executed with the mutant active.
    pub fn executions_of(&self, id: MutantId) -> usize {
        self.executions.get(&id).copied().unwrap_or(0)
    }

    /// Analyze every test method of `class`.
    ///
    /// A method whose unmutated run fails to execute is logged and skipped.
    /// The first such error is returned only when no method could be run.
    pub fn run<B>(
        &mut self,
        backend: &mut B,
        ctx: &mut ExecutionContext,
        class: &TestClass,
    ) -> Result<Vec<MutationRunRecord>, RunnerError>
    where
        B: TestExecutionBackend + ?Sized,
    {
        let mut records = Vec::new();
        let mut first_error = None;
        for method in class.test_methods() {
            match self.run_method(backend, ctx, class, &method) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(
                        class = %class.name,
                        method = %method,
                        error = %err,
                        "baseline execution failed, skipping method"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error.filter(|_| records.is_empty()) {
            return Err(err);
        }
        info!(
            class = %class.name,
            live = self.live.len(),
            killed = self.killed.len(),
            "mutation analysis finished"
        );
        Ok(records)
    }

    fn run_method<B>(
        &mut self,
        backend: &mut B,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: &str,
    ) -> Result<MutationRunRecord, RunnerError>
    where
        B: TestExecutionBackend + ?Sized,
    {
        ctx.clear_trace();
        let baseline = backend.run_method(ctx, class, method)?;
        let touched: Vec<MutantId> = baseline.trace().touched_mutants.into_iter().collect();

        let mut record = MutationRunRecord {
            test: TestIdentity::method(class.name.clone(), method),
            baseline_successful: baseline.successful,
            touched: touched.clone(),
            killed: Vec::new(),
            skipped: Vec::new(),
        };

        for id in touched {
            if self.killed.contains(&id) {
                record.skipped.push(id);
                continue;
            }
            if !self.live.contains(&id) {
                debug!(mutant = %id, "touched mutant is not tracked by this runner");
                continue;
            }

            ctx.clear_trace();
            *self.executions.entry(id).or_default() += 1;
            let rerun = {
                let mut active = ctx.activate_mutant(id);
                backend.run_method(&mut active, class, method)
            };
            match rerun {
                Ok(outcome) if outcome.successful != baseline.successful => {
                    self.live.remove(&id);
                    self.killed.insert(id);
                    record.killed.push(id);
                    debug!(mutant = %id, test = %record.test, "mutant killed");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        mutant = %id,
                        test = %record.test,
                        error = %err,
                        "mutant execution failed"
                    );
                }
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proptest::prelude::*;

    use super::*;
    use crate::classes::{JUNIT4_TEST_ANNOTATION, MethodInfo};
    use crate::context::{LoaderHandle, ManagedSandbox};
    use crate::outcome::TestOutcome;
    use crate::trace::ExecutionTrace;

    /// Every method touches `touches`; it fails when a mutant in `killers` is active.
    /// Methods in `unlaunchable` cannot be run at all.
    struct FakeBackend {
        touches: Vec<MutantId>,
        killers: BTreeSet<MutantId>,
        broken: BTreeSet<MutantId>,
        unlaunchable: BTreeSet<&'static str>,
    }

    impl TestExecutionBackend for FakeBackend {
        fn run(
            &mut self,
            _ctx: &mut ExecutionContext,
            _classes: &[TestClass],
        ) -> Result<Vec<TestOutcome>, RunnerError> {
            Ok(Vec::new())
        }

        fn run_method(
            &mut self,
            ctx: &mut ExecutionContext,
            class: &TestClass,
            method: &str,
        ) -> Result<TestOutcome, RunnerError> {
            if self.unlaunchable.contains(method) {
                return Err(RunnerError::Launcher(format!("cannot launch {method}")));
            }
            let mut outcome = TestOutcome::new(TestIdentity::method(class.name.clone(), method));
            if let Some(active) = ctx.active_mutant() {
                if self.broken.contains(&active) {
                    return Err(RunnerError::Launcher("crashed".to_string()));
                }
                outcome.successful = !self.killers.contains(&active);
            }
            let mut trace = ExecutionTrace::default();
            trace.touched_mutants.extend(self.touches.iter().copied());
            outcome.execution_trace = Some(trace);
            outcome.run_count = 1;
            Ok(outcome)
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            LoaderHandle::instrumenting([PathBuf::from("/sut")]),
            Box::new(ManagedSandbox::default()),
        )
    }

    fn class_with(methods: &[&str]) -> TestClass {
        methods.iter().fold(TestClass::new("FooTest"), |class, m| {
            class.with_method(MethodInfo::new(*m, &[JUNIT4_TEST_ANNOTATION]))
        })
    }

    #[test]
    fn killed_mutant_is_skipped_by_later_methods() {
        let mut backend = FakeBackend {
            touches: vec![MutantId(7)],
            killers: [MutantId(7)].into_iter().collect(),
            broken: BTreeSet::new(),
            unlaunchable: BTreeSet::new(),
        };
        let mut runner = MutationAwareRunner::new([MutantId(7), MutantId(8)]);
        let mut ctx = ctx();
        let records = runner
            .run(&mut backend, &mut ctx, &class_with(&["testPositive", "testAgain"]))
            .expect("analysis should run");

        assert_eq!(records[0].killed, vec![MutantId(7)]);
        assert_eq!(records[1].skipped, vec![MutantId(7)]);
        assert!(records[1].killed.is_empty());
        assert_eq!(runner.executions_of(MutantId(7)), 1);
        assert!(runner.killed().contains(&MutantId(7)));
        assert!(runner.live().contains(&MutantId(8)));
        assert!(ctx.active_mutant().is_none());
    }

    #[test]
    fn failing_rerun_leaves_mutant_live() {
        let mut backend = FakeBackend {
            touches: vec![MutantId(1)],
            killers: BTreeSet::new(),
            broken: [MutantId(1)].into_iter().collect(),
            unlaunchable: BTreeSet::new(),
        };
        let mut runner = MutationAwareRunner::new([MutantId(1)]);
        let mut ctx = ctx();
        runner
            .run(&mut backend, &mut ctx, &class_with(&["t"]))
            .expect("analysis should run");
        assert!(runner.live().contains(&MutantId(1)));
        assert!(runner.killed().is_empty());
        assert!(ctx.active_mutant().is_none());
    }

    #[test]
    fn method_that_cannot_run_does_not_stop_the_class() {
        let mut backend = FakeBackend {
            touches: vec![MutantId(7)],
            killers: [MutantId(7)].into_iter().collect(),
            broken: BTreeSet::new(),
            unlaunchable: ["a"].into_iter().collect(),
        };
        let mut runner = MutationAwareRunner::new([MutantId(7)]);
        let mut ctx = ctx();
        let records = runner
            .run(&mut backend, &mut ctx, &class_with(&["a", "b"]))
            .expect("analysis should continue past the broken method");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test.method_name.as_deref(), Some("b"));
        assert_eq!(records[0].killed, vec![MutantId(7)]);
        assert!(runner.killed().contains(&MutantId(7)));
        assert!(runner.live().is_empty());

        let err = MutationAwareRunner::new([MutantId(7)])
            .run(&mut backend, &mut ctx, &class_with(&["a"]))
            .expect_err("class with no runnable method should fail");
        assert!(matches!(err, RunnerError::Launcher(_)));
    }

    proptest! {
        #[test]
        fn live_and_killed_partition_the_mutant_set(
            all in proptest::collection::btree_set(0u32..20, 0..10),
            killers in proptest::collection::btree_set(0u32..20, 0..10),
            touches in proptest::collection::vec(0u32..25, 0..12),
            methods in 1usize..4,
        ) {
            let mut backend = FakeBackend {
                touches: touches.iter().copied().map(MutantId).collect(),
                killers: killers.iter().copied().map(MutantId).collect(),
                broken: BTreeSet::new(),
                unlaunchable: BTreeSet::new(),
            };
            let all: BTreeSet<MutantId> = all.into_iter().map(MutantId).collect();
            let mut runner = MutationAwareRunner::new(all.iter().copied());
            let names: Vec<String> = (0..methods).map(|i| format!("test{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut ctx = ctx();
            runner.run(&mut backend, &mut ctx, &class_with(&refs)).expect("analysis should run");

            prop_assert!(runner.live().is_disjoint(runner.killed()));
            let union: BTreeSet<MutantId> = runner.live().union(runner.killed()).copied().collect();
            prop_assert_eq!(union, all);
            for id in runner.killed() {
                prop_assert_eq!(runner.executions_of(*id), 1);
            }
        }
    }
}
