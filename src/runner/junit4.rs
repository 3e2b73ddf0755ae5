//! JUnit 4 style backend.

use std::time::Instant;

use tracing::{debug, warn};

use super::{
    RunEvent, RunListener, RunnerError, TestExecutionBackend, run_bracketed, select_method_outcome,
};
use crate::classes::TestClass;
use crate::context::ExecutionContext;
use crate::outcome::builder::build_failure;
use crate::outcome::{TestIdentity, TestOutcome};

/// Runner that executes one class and streams JUnit 4 style events.
pub trait NativeRunner {
    /// Run `class`, restricted to `method` when given.
    fn run_class(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: Option<&str>,
        listener: &mut dyn RunListener,
    ) -> Result<(), RunnerError>;
}

/// Builds one [`TestOutcome`] per executed test method.
#[derive(Debug)]
pub struct OutcomeListener {
    class_name: String,
    current: Option<(TestOutcome, Instant)>,
    published: Vec<TestOutcome>,
}

impl OutcomeListener {
    /// Listener for a run of `class_name`.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            current: None,
            published: Vec::new(),
        }
    }

    /// Published outcomes, in execution order.
    ///
    /// A test that started but never finished is published as is.
    pub fn finish(mut self, ctx: &mut ExecutionContext) -> Vec<TestOutcome> {
        if let Some((mut outcome, started)) = self.current.take() {
            warn!(test = %outcome.identity, "test started but never finished");
            outcome.record_finish(started.elapsed(), ctx.take_trace());
            self.published.push(outcome);
        }
        self.published
    }
}

impl RunListener for OutcomeListener {
    fn on_event(&mut self, ctx: &mut ExecutionContext, event: RunEvent) {
        match event {
            RunEvent::TestStarted {
                class_name,
                method_name,
                ..
            } => {
                let identity = TestIdentity {
                    class_name,
                    method_name,
                };
                self.current = Some((TestOutcome::new(identity), Instant::now()));
            }
            RunEvent::TestFailure {
                class_name,
                failure,
            } => {
                let mut failure = build_failure(&failure);
                match self.current.as_mut() {
                    Some((outcome, _)) => {
                        // The running test owns failures reported without a method.
                        if failure.method_name.is_none() {
                            failure.method_name = outcome.identity.method_name.clone();
                        }
                        outcome.record_failure(failure);
                    }
                    None => {
                        // Class initialization or class-level setup failed.
                        let mut outcome = TestOutcome::new(TestIdentity {
                            class_name,
                            method_name: failure.method_name.clone(),
                        });
                        outcome.record_failure(failure);
                        self.published.push(outcome);
                    }
                }
            }
            RunEvent::TestFinished { .. } => match self.current.take() {
                Some((mut outcome, started)) => {
                    outcome.record_finish(started.elapsed(), ctx.take_trace());
                    self.published.push(outcome);
                }
                None => debug!(class = %self.class_name, "finish without matching start"),
            },
            RunEvent::RunFinished {
                run_count,
                failure_count,
                ..
            } => {
                debug!(class = %self.class_name, run_count, failure_count, "class finished");
            }
            RunEvent::Trace { fragment } => ctx.record(fragment),
            RunEvent::ExecutionFinished { identifier, .. } => {
                debug!(node = %identifier.unique_id, "ignoring platform event in JUnit 4 run");
            }
        }
    }
}

/// [`TestExecutionBackend`] over a [`NativeRunner`].
#[derive(Debug)]
pub struct Junit4Backend<R> {
    runner: R,
}

impl<R: NativeRunner> Junit4Backend<R> {
    /// Wrap a runner.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Underlying runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn run_filtered(
        &mut self,
        ctx: &mut ExecutionContext,
        classes: &[TestClass],
        method: Option<&str>,
    ) -> Result<Vec<TestOutcome>, RunnerError> {
        let runner = &mut self.runner;
        run_bracketed(ctx, classes, |ctx, class| {
            let mut listener = OutcomeListener::new(class.name.clone());
            runner.run_class(ctx, class, method, &mut listener)?;
            Ok(listener.finish(ctx))
        })
    }
}

impl<R: NativeRunner> TestExecutionBackend for Junit4Backend<R> {
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
