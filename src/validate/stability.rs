//! Compile and stability filtering of candidate pools.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::classify::{CandidateState, Decision, ObservedOutcome, classify, decide};
use super::classpath::compile_classpath;
use super::compiler::{Compiler, CompilerError};
use super::loader::{LoadError, LoadedSuite, load_suite};
use super::tmpdir::ScopedTempDir;
use super::writer::{SuiteWriter, WriterError};
use super::{CandidateTest, GeneratedArtifact, next_suite_name};
use crate::budget::TimeBudget;
use crate::config::OracleConfig;
use crate::context::{ExecutionContext, with_sandbox_suspended};
use crate::outcome::builder::aggregate;
use crate::outcome::{Failure, TestOutcome};
use crate::runner::{RunnerError, TestExecutionBackend};

const TEMP_PREFIX: &str = "suite-oracle";

/// Errors of one compile-load-execute cycle.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Temp dir could not be created.
    #[error("cannot create temp dir: {0}")]
    TempDir(std::io::Error),
    /// Rendering failed.
    #[error(transparent)]
    Writer(#[from] WriterError),
    /// Compilation failed.
    #[error(transparent)]
    Compiler(#[from] CompilerError),
    /// Loading the compiled classes failed.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Execution failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// The time budget ran out.
    #[error("ran out of time while checking tests")]
    OutOfTime,
}

/// Result of the compile filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileFilterReport {
    /// Candidates that compiled.
    pub kept: Vec<String>,
    /// Candidates removed because they do not compile.
    pub removed: Vec<String>,
    /// Candidates left in the pool unchecked because time ran out.
    pub unchecked: Vec<String>,
}

/// Result of the stability filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StabilityReport {
    /// Terminal state of every candidate that entered the filter.
    pub states: BTreeMap<String, CandidateState>,
    /// Candidates flagged unstable, or the pool size on a scaffolding failure.
    pub unstable: usize,
    /// Reason the whole pool was discarded.
    pub scaffolding_failure: Option<String>,
    /// Completed suite executions.
    pub executions: usize,
    /// Whether the suite was executed and classified; when false the pool
    /// was left untouched.
    pub completed: bool,
}

impl StabilityReport {
    fn untouched(tests: &[CandidateTest]) -> Self {
        Self {
            states: tests
                .iter()
                .map(|t| (t.name.clone(), CandidateState::KeptStable))
                .collect(),
            ..Self::default()
        }
    }

    /// Number of candidates in `state`.
    pub fn count(&self, state: CandidateState) -> usize {
        self.states.values().filter(|&&s| s == state).count()
    }
}

/// Removes candidates that do not compile, then marks or removes candidates
/// whose execution fails.
pub struct StabilityValidator<'a> {
    config: &'a OracleConfig,
    writer: &'a dyn SuiteWriter,
    compiler: &'a dyn Compiler,
    backend: &'a mut dyn TestExecutionBackend,
    budget: &'a dyn TimeBudget,
    temp_root: Option<PathBuf>,
}

impl<'a> StabilityValidator<'a> {
    /// Validator over the given collaborators.
    pub fn new(
        config: &'a OracleConfig,
        writer: &'a dyn SuiteWriter,
        compiler: &'a dyn Compiler,
        backend: &'a mut dyn TestExecutionBackend,
        budget: &'a dyn TimeBudget,
    ) -> Self {
        Self {
            config,
            writer,
            compiler,
            backend,
            budget,
            temp_root: None,
        }
    }

    /// Create temp dirs under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Whether the configured compiler can be used.
    pub fn is_compiler_available(&self) -> bool {
        self.compiler.is_available()
    }

    fn temp_dir(&self) -> Result<ScopedTempDir, ValidationError> {
        match &self.temp_root {
            Some(root) => ScopedTempDir::new_in(root, TEMP_PREFIX),
            None => ScopedTempDir::new(TEMP_PREFIX),
        }
        .map_err(ValidationError::TempDir)
    }

    fn compile_suite(
        &self,
        tests: &[CandidateTest],
        dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, ValidationError> {
        let name = next_suite_name(&self.config.target.class, &self.config.target.junit_suffix);
        let sources = self.writer.write_suite(&name, tests, dir)?;
        let classpath = compile_classpath(
            &self.config.classpath.target_project,
            &self.config.classpath.generator,
            &self.config.classpath.pathing_marker,
        );
        Ok(self.compiler.compile(&sources, &classpath, dir)?)
    }

    /// Execute `suite` under its own loader with the sandbox suspended.
    fn execute(
        &mut self,
        ctx: &mut ExecutionContext,
        suite: &LoadedSuite,
        executions: usize,
    ) -> Result<(Vec<TestOutcome>, usize), RunnerError> {
        let backend = &mut *self.backend;
        let budget = self.budget;
        with_sandbox_suspended(ctx, |ctx| -> Result<(Vec<TestOutcome>, usize), RunnerError> {
            let mut scoped = ctx.with_context_loader(suite.loader.clone());
            let mut outcomes = Vec::new();
            let mut completed = 0;
            for run in 0..executions.max(1) {
                if run > 0 && !budget.has_time_to_execute_a_test_case() {
                    info!(completed, "stopping repeated executions, out of time");
                    break;
                }
                outcomes.extend(backend.run(&mut *scoped, &suite.tests)?);
                completed += 1;
            }
            Ok((outcomes, completed))
        })
    }

    /// Compile every candidate on its own and drop those that fail.
    ///
    /// Stops checking when the budget is exhausted; unchecked candidates
    /// stay in the pool.
    pub fn remove_tests_that_do_not_compile(
        &mut self,
        tests: &mut Vec<CandidateTest>,
    ) -> CompileFilterReport {
        info!(candidates = tests.len(), "removing tests that do not compile");
        let mut report = CompileFilterReport::default();
        let mut kept = Vec::with_capacity(tests.len());
        let mut pending = std::mem::take(tests).into_iter();

        while let Some(test) = pending.next() {
            if !self.budget.has_time_to_execute_a_test_case() {
                warn!("ran out of time while compiling tests");
                report.unchecked.push(test.name.clone());
                report.unchecked.extend(pending.as_slice().iter().map(|t| t.name.clone()));
                kept.push(test);
                kept.extend(pending.by_ref());
                break;
            }

            let dir = match self.temp_dir() {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(error = %err, "failed to create temp dir");
                    report.unchecked.push(test.name.clone());
                    report.unchecked.extend(pending.as_slice().iter().map(|t| t.name.clone()));
                    kept.push(test);
                    kept.extend(pending.by_ref());
                    break;
                }
            };

            match self.compile_suite(std::slice::from_ref(&test), dir.path()) {
                Ok(_) => {
                    debug!(test = %test.name, "test compiles");
                    report.kept.push(test.name.clone());
                    kept.push(test);
                }
                Err(err) => {
                    error!(
                        test = %test.name,
                        error = %err,
                        "failed to compile test case:\n{}",
                        test.code
                    );
                    report.removed.push(test.name.clone());
                }
            }
        }

        *tests = kept;
        report
    }

    /// Compile and execute the whole pool; flag tests whose assertions fail
    /// as unstable and remove tests that fail otherwise.
    ///
    /// A failure of shared scaffolding clears the whole pool. Problems that
    /// prevent execution leave the pool untouched.
    pub fn handle_tests_that_are_unstable(
        &mut self,
        tests: &mut Vec<CandidateTest>,
        ctx: &mut ExecutionContext,
    ) -> StabilityReport {
        info!(candidates = tests.len(), "handling tests that are unstable");
        let mut report = StabilityReport::untouched(tests);
        if tests.is_empty() {
            report.completed = true;
            return report;
        }

        let outcomes = match self.compile_load_execute(tests, ctx) {
            Ok((outcomes, executions)) => {
                report.executions = executions;
                outcomes
            }
            Err(err) => {
                match err {
                    ValidationError::OutOfTime => error!("{err}"),
                    ValidationError::Compiler(_) | ValidationError::Writer(_) => {
                        warn!(error = %err, "failed to compile the test cases")
                    }
                    _ => error!(error = %err, "failed to execute the test cases"),
                }
                return report;
            }
        };
        report.completed = true;

        let result = aggregate(&outcomes);
        if result.successful {
            debug!(runs = result.run_count, "all candidates passed");
            return report;
        }

        let mut seen = BTreeSet::new();
        for failure in &result.failures {
            if let Some(method) = &failure.method_name {
                if !seen.insert(method.clone()) {
                    continue;
                }
            }
            let observed = classify(failure, tests);
            match decide(&observed) {
                Decision::KeepStable => {}
                Decision::Ignore => log_ignored(&observed, failure),
                Decision::DiscardAll => {
                    let reason = match observed {
                        ObservedOutcome::ScaffoldingFailure(reason) => reason,
                        _ => failure.trace_text(),
                    };
                    error!("issue in scaffolding of the test suite: {reason}");
                    for test in tests.iter() {
                        report.states.insert(test.name.clone(), CandidateState::AllDiscarded);
                    }
                    report.unstable = tests.len();
                    report.scaffolding_failure = Some(reason);
                    tests.clear();
                    return report;
                }
                Decision::KeepUnstable => {
                    log_unstable(failure);
                    let owner = failure.method_name.as_ref();
                    if let Some(test) = tests.iter_mut().find(|t| Some(&t.name) == owner) {
                        debug!(test = %test.name, "marking test as unstable");
                        test.unstable = true;
                        report.unstable += 1;
                        report.states.insert(test.name.clone(), CandidateState::KeptUnstable);
                    }
                }
                Decision::Discard => {
                    log_unstable(failure);
                    let owner = failure.method_name.as_ref();
                    if let Some(pos) = tests.iter().position(|t| Some(&t.name) == owner) {
                        let test = tests.remove(pos);
                        warn!(test = %test.name, "removing failing test:\n{}", test.code);
                        report.states.insert(test.name, CandidateState::Discarded);
                    }
                }
            }
        }
        report
    }

    fn compile_load_execute(
        &mut self,
        tests: &[CandidateTest],
        ctx: &mut ExecutionContext,
    ) -> Result<(Vec<TestOutcome>, usize), ValidationError> {
        let dir = self.temp_dir()?;
        let compiled = self.compile_suite(tests, dir.path())?;
        if !self.budget.has_time_to_execute_a_test_case() {
            return Err(ValidationError::OutOfTime);
        }
        let suite = load_suite(dir.path(), &compiled)?;
        let executions = self.config.stability.executions;
        Ok(self.execute(ctx, &suite, executions)?)
    }

    /// Compile and execute the whole pool once; true if everything passed.
    pub fn verify_compilation_and_execution(
        &mut self,
        tests: &[CandidateTest],
        ctx: &mut ExecutionContext,
    ) -> bool {
        if tests.is_empty() {
            return true;
        }
        let dir = match self.temp_dir() {
            Ok(dir) => dir,
            Err(err) => {
                warn!(error = %err, "failed to create temp dir");
                return false;
            }
        };
        let suite = match self
            .compile_suite(tests, dir.path())
            .and_then(|compiled| Ok(load_suite(dir.path(), &compiled)?))
        {
            Ok(suite) => suite,
            Err(err) => {
                warn!(error = %err, "failed to compile the test cases");
                return false;
            }
        };
        let result = match self.execute(ctx, &suite, 1) {
            Ok((outcomes, _)) => aggregate(&outcomes),
            Err(err) => {
                error!(error = %err, "failed to execute the test cases");
                return false;
            }
        };
        if !result.successful {
            error!(failures = result.failure_count, "test cases failed");
            for failure in &result.failures {
                error!("failure {}", failure.trace_text());
            }
            return false;
        }
        if result.run_count == 0 {
            warn!("there was no test to run");
        }
        debug!(target_class = %self.config.target.class, "compiled and ran generated tests");
        true
    }
}

fn log_ignored(observed: &ObservedOutcome, failure: &Failure) {
    let method = failure.method_name.as_deref().unwrap_or_default();
    match observed {
        ObservedOutcome::ExpectedFailure => info!(test = method, "failure is expected, continuing"),
        ObservedOutcome::KnownEnvironmentFlake => {
            warn!("likely error with instrumentation, ignoring failure in test execution")
        }
        _ => warn!(test = method, "failure matches no candidate test, ignoring"),
    }
}

fn log_unstable(failure: &Failure) {
    warn!(
        test = failure.method_name.as_deref().unwrap_or_default(),
        exception = %failure.exception_class,
        message = failure.message.as_deref().unwrap_or_default(),
        "found unstable test"
    );
    for frame in &failure.stack_trace {
        info!("exception trace: {frame}");
    }
}
