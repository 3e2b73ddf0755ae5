//! JUnit 5 platform backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{
    RunEvent, RunListener, RunnerError, TestExecutionBackend, run_bracketed, select_method_outcome,
};
use crate::classes::TestClass;
use crate::context::ExecutionContext;
use crate::outcome::TestOutcome;
use crate::outcome::builder::{TestExecutionResult, TestIdentifier, build_platform};
use crate::trace::ExecutionTrace;

/// Platform launcher that discovers and executes one class.
pub trait PlatformLauncher {
    /// Execute `class`, restricted to `method` when given.
    fn execute(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: Option<&str>,
        listener: &mut dyn RunListener,
    ) -> Result<(), RunnerError>;
}

struct Finished {
    identifier: TestIdentifier,
    result: TestExecutionResult,
    runtime: Duration,
    trace: ExecutionTrace,
}

/// Accumulates finished plan nodes.
#[derive(Default)]
pub struct PlatformListener {
    started: HashMap<String, Instant>,
    finished: Vec<Finished>,
}

impl PlatformListener {
    /// Empty listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished `(identifier, result)` pairs, in execution order.
    pub fn results(&self) -> Vec<(TestIdentifier, TestExecutionResult)> {
        self.finished
            .iter()
            .map(|f| (f.identifier.clone(), f.result.clone()))
            .collect()
    }

    /// Reduce to outcomes, attaching runtime and trace of every test leaf.
    pub fn into_outcomes(self) -> Vec<TestOutcome> {
        let mut outcomes = Vec::with_capacity(self.finished.len());
        for finished in self.finished {
            let pair = [(finished.identifier, finished.result)];
            for mut outcome in build_platform(&pair) {
                if outcome.run_count > 0 {
                    outcome.runtime = finished.runtime;
                    outcome.execution_trace = Some(finished.trace.clone());
                }
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

impl RunListener for PlatformListener {
    fn on_event(&mut self, ctx: &mut ExecutionContext, event: RunEvent) {
        match event {
            RunEvent::TestStarted {
                unique_id: Some(unique_id),
                ..
            } => {
                self.started.insert(unique_id, Instant::now());
            }
            RunEvent::Trace { fragment } => ctx.record(fragment),
            RunEvent::ExecutionFinished { identifier, result } => {
                let runtime = self
                    .started
                    .remove(&identifier.unique_id)
                    .map(|started| started.elapsed())
                    .unwrap_or_default();
                let trace = if identifier.is_test {
                    ctx.take_trace()
                } else {
                    ExecutionTrace::default()
                };
                self.finished.push(Finished {
                    identifier,
                    result,
                    runtime,
                    trace,
                });
            }
            other => debug!(event = ?other, "ignoring event in platform run"),
        }
    }
}

/// [`TestExecutionBackend`] over a [`PlatformLauncher`].
#[derive(Debug)]
pub struct Junit5Backend<L> {
    launcher: L,
}

impl<L: PlatformLauncher> Junit5Backend<L> {
    /// Wrap a launcher.
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    fn run_filtered(
        &mut self,
        ctx: &mut ExecutionContext,
        classes: &[TestClass],
        method: Option<&str>,
    ) -> Result<Vec<TestOutcome>, RunnerError> {
        let launcher = &mut self.launcher;
        run_bracketed(ctx, classes, |ctx, class| {
            let mut listener = PlatformListener::new();
            launcher.execute(ctx, class, method, &mut listener)?;
            Ok(listener.into_outcomes())
        })
    }
}

impl<L: PlatformLauncher> TestExecutionBackend for Junit5Backend<L> {
    fn run(
        &mut self,
        ctx: &mut ExecutionContext,
        classes: &[TestClass],
    ) -> Result<Vec<TestOutcome>, RunnerError> {
        self.run_filtered(ctx, classes, None)
    }

    fn run_method(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: &str,
    ) -> Result<TestOutcome, RunnerError> {
        let outcomes = self.run_filtered(ctx, std::slice::from_ref(class), Some(method))?;
        select_method_outcome(class, method, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::context::{LoaderHandle, ManagedSandbox};
    use crate::outcome::builder::NativeFailure;
    use crate::trace::TraceFragment;

    struct ScriptedLauncher {
        events: Vec<RunEvent>,
    }

    impl PlatformLauncher for ScriptedLauncher {
        fn execute(
            &mut self,
            ctx: &mut ExecutionContext,
            _class: &TestClass,
            _method: Option<&str>,
            listener: &mut dyn RunListener,
        ) -> Result<(), RunnerError> {
            for event in self.events.clone() {
                listener.on_event(ctx, event);
            }
            Ok(())
        }
    }

    fn leaf(name: &str) -> TestIdentifier {
        TestIdentifier {
            unique_id: format!("[method:{name}()]"),
            display_name: format!("{name}()"),
            class_name: "BarTest".to_string(),
            is_test: true,
        }
    }

    #[test]
    fn leaves_become_outcomes_with_traces() {
        let mut fragment = TraceFragment::default();
        fragment.methods.insert("Bar.run".to_string());
        let launcher = ScriptedLauncher {
            events: vec![
                RunEvent::TestStarted {
                    class_name: "BarTest".to_string(),
                    method_name: Some("works".to_string()),
                    unique_id: Some(leaf("works").unique_id),
                },
                RunEvent::Trace { fragment },
                RunEvent::ExecutionFinished {
                    identifier: leaf("works"),
                    result: TestExecutionResult::Successful,
                },
                RunEvent::ExecutionFinished {
                    identifier: leaf("breaks"),
                    result: TestExecutionResult::Failed {
                        failure: NativeFailure {
                            exception_class: "org.opentest4j.AssertionFailedError".to_string(),
                            hierarchy: vec!["java.lang.AssertionError".to_string()],
                            ..NativeFailure::default()
                        },
                    },
                },
                RunEvent::ExecutionFinished {
                    identifier: TestIdentifier {
                        unique_id: "[class:BarTest]".to_string(),
                        display_name: "BarTest".to_string(),
                        class_name: "BarTest".to_string(),
                        is_test: false,
                    },
                    result: TestExecutionResult::Successful,
                },
            ],
        };
        let mut backend = Junit5Backend::new(launcher);
        let mut ctx = ExecutionContext::new(
            LoaderHandle::instrumenting([PathBuf::from("/sut")]),
            Box::new(ManagedSandbox::default()),
        );
        let outcomes = backend
            .run(&mut ctx, &[TestClass::new("BarTest")])
            .expect("run should succeed");

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].method_name(), Some("works"));
        assert!(outcomes[0].trace().methods.contains("Bar.run"));
        assert!(!outcomes[1].successful);
        assert!(outcomes[1].failures[0].is_assertion_error);
        assert_eq!(outcomes[1].failures[0].method_name.as_deref(), Some("breaks"));

        let single = backend
            .run_method(&mut ctx, &TestClass::new("BarTest"), "breaks")
            .expect("method should run");
        assert_eq!(single.method_name(), Some("breaks"));
    }
}
