//! Coverage analysis of existing test suites.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use tracing::{error, info, warn};

use super::criterion::Criterion;
use super::discovery::{discover_tests, order_tests, resolve_targets};
use super::goals::{CoverageGoal, GoalFactory, mutation_goals, sort_goals};
use super::matrix::MatrixBuilder;
use super::report::{CoverageReport, CriterionCoverage, GoalReport, TargetCoverage};
use crate::classes::{ClassIndex, TestClass};
use crate::config::OracleConfig;
use crate::context::ExecutionContext;
use crate::mutant::{MutantId, MutantPool};
use crate::outcome::TestOutcome;
use crate::runner::TestExecutionBackend;
use crate::stats::{RuntimeVariable, StatValue, StatisticsSink};

/// Covered / total, 1.0 when there is nothing to cover.
pub fn coverage_ratio(covered: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

/// `0`/`1` per goal, `"1"` when there are no goals.
pub fn bit_string(covered: &[bool]) -> String {
    if covered.is_empty() {
        return "1".to_string();
    }
    covered.iter().map(|&c| if c { '1' } else { '0' }).collect()
}

/// Indices of the goals covered by the trace of at least one outcome.
pub fn covered_goals(outcomes: &[TestOutcome], goals: &[Box<dyn CoverageGoal>]) -> BTreeSet<usize> {
    let traces: Vec<_> = outcomes.iter().map(TestOutcome::trace).collect();
    goals
        .iter()
        .enumerate()
        .filter(|(_, goal)| traces.iter().any(|trace| goal.is_covered(trace)))
        .map(|(i, _)| i)
        .collect()
}

/// Trace-based coverage of `goals` by `outcomes`.
pub fn coverage_of(outcomes: &[TestOutcome], goals: &[Box<dyn CoverageGoal>]) -> f64 {
    coverage_ratio(covered_goals(outcomes, goals).len(), goals.len())
}

type RerunCache = HashMap<(String, MutantId), Vec<TestOutcome>>;

/// Runs existing tests once and measures which goals they cover.
pub struct CoverageAnalyzer<'a> {
    config: &'a OracleConfig,
    index: &'a dyn ClassIndex,
    goals: &'a dyn GoalFactory,
    backend: &'a mut dyn TestExecutionBackend,
    sink: &'a mut dyn StatisticsSink,
}

impl<'a> CoverageAnalyzer<'a> {
    /// Analyzer over the given collaborators.
    pub fn new(
        config: &'a OracleConfig,
        index: &'a dyn ClassIndex,
        goals: &'a dyn GoalFactory,
        backend: &'a mut dyn TestExecutionBackend,
        sink: &'a mut dyn StatisticsSink,
    ) -> Self {
        Self {
            config,
            index,
            goals,
            backend,
            sink,
        }
    }

    /// Analyze every target class.
    ///
    /// Problems that make the analysis meaningless are logged and yield an
    /// empty report. Statistics of all but the last target are flushed.
    pub fn analyze(&mut self, ctx: &mut ExecutionContext) -> CoverageReport {
        let started = Instant::now();

        let targets = {
            let _scope = ctx.execution_scope();
            resolve_targets(self.index, &self.config.target.class)
        };
        let targets = match targets {
            Ok(targets) if !targets.is_empty() => targets,
            Ok(_) => {
                warn!(class = %self.config.target.class, "no target classes to analyze");
                return CoverageReport::empty();
            }
            Err(err) => {
                error!(
                    class = %self.config.target.class,
                    error = %err,
                    "failed to resolve target classes"
                );
                return CoverageReport::empty();
            }
        };

        if ctx.mutant_pool().is_empty() {
            let mutants = self.index.mutants();
            if !mutants.is_empty() {
                let loader = ctx.sut_loader().clone();
                ctx.set_mutant_pool(&loader, MutantPool::new(mutants));
            }
        }

        let mut tests = discover_tests(self.index, &self.config.target.test_prefix, &targets);
        order_tests(&mut tests, self.config.coverage.ordering);
        info!(
            targets = targets.len(),
            tests = tests.len(),
            "found test classes for coverage analysis"
        );

        let outcomes = if tests.is_empty() {
            warn!(prefix = %self.config.target.test_prefix, "no test classes found");
            Vec::new()
        } else {
            match self.backend.run(ctx, &tests) {
                Ok(outcomes) => outcomes,
                Err(err) => {
                    error!(error = %err, "failed to execute test classes");
                    return CoverageReport::empty();
                }
            }
        };
        info!(tests = outcomes.len(), "executed tests");

        let explicit_exceptions: BTreeSet<String> = outcomes
            .iter()
            .filter_map(|o| o.execution_trace.as_ref()?.explicit_exception.clone())
            .collect();

        let mut report = CoverageReport {
            targets: Vec::with_capacity(targets.len()),
            test_classes: tests.iter().map(|t| t.name.clone()).collect(),
            tests_executed: outcomes.len(),
            explicit_exceptions,
            total_time: Default::default(),
        };

        let mut cache = RerunCache::new();
        for (i, target) in targets.iter().enumerate() {
            let coverage = self.analyze_target(ctx, target, &tests, &outcomes, &mut cache);
            self.track(&coverage, &report, started);
            if i + 1 < targets.len() {
                self.sink.flush_class_change();
            }
            report.targets.push(coverage);
        }
        report.total_time = started.elapsed();
        report
    }

    fn analyze_target(
        &mut self,
        ctx: &mut ExecutionContext,
        target: &str,
        tests: &[TestClass],
        outcomes: &[TestOutcome],
        cache: &mut RerunCache,
    ) -> TargetCoverage {
        let config = self.config;
        let mut criteria = Vec::with_capacity(config.coverage.criteria.len());
        let mut covering_tests = vec![false; outcomes.len()];
        let mut combined_rows: Vec<Vec<bool>> = vec![Vec::new(); outcomes.len()];

        for &criterion in &config.coverage.criteria {
            let mut goals = if criterion.is_mutation() {
                mutation_goals(target, ctx.mutant_pool().mutants())
            } else {
                self.goals.goals(target, criterion)
            };
            sort_goals(&mut goals);

            let mut covered = vec![false; goals.len()];
            let mut covered_by = vec![None; goals.len()];
            let mut matrix = MatrixBuilder::new(goals.len());

            for (ti, outcome) in outcomes.iter().enumerate() {
                let trace = outcome.trace();
                let mut row = vec![false; goals.len()];
                for (gi, goal) in goals.iter().enumerate() {
                    if covered[gi] || !goal.is_covered(&trace) {
                        continue;
                    }
                    let hit = match goal.mutant() {
                        Some(mutant) if criterion.requires_kill() => {
                            self.is_killed(ctx, mutant, outcome, tests, outcomes, cache)
                        }
                        _ => true,
                    };
                    if hit {
                        covered[gi] = true;
                        covered_by[gi] = Some(outcome.identity.clone());
                        row[gi] = true;
                        covering_tests[ti] = true;
                    }
                }
                combined_rows[ti].extend_from_slice(&row);
                matrix.push_row(&row, outcome.successful);
            }

            let covered_goals = covered.iter().filter(|&&c| c).count();
            info!(
                class = target,
                criterion = %criterion,
                covered = covered_goals,
                total = goals.len(),
                "covered {}/{} goals",
                covered_goals,
                goals.len()
            );
            criteria.push(CriterionCoverage {
                criterion,
                total_goals: goals.len(),
                covered_goals,
                coverage: coverage_ratio(covered_goals, goals.len()),
                bit_string: bit_string(&covered),
                goals: goals
                    .iter()
                    .zip(covered_by)
                    .map(|(goal, covered_by)| GoalReport {
                        goal: goal.describe(),
                        covered_by,
                    })
                    .collect(),
                matrix: matrix.build(),
            });
        }

        let total_goals: usize = criteria.iter().map(|c| c.total_goals).sum();
        let covered_goals: usize = criteria.iter().map(|c| c.covered_goals).sum();
        let bit_string: String = criteria.iter().map(|c| c.bit_string.as_str()).collect();

        let matrix_path = if config.coverage.matrix {
            let mut combined = MatrixBuilder::new(total_goals);
            for (row, outcome) in combined_rows.iter().zip(outcomes) {
                combined.push_row(row, outcome.successful);
            }
            match combined.build().write(&config.coverage.report_dir, target) {
                Ok(path) => Some(path),
                Err(err) => {
                    error!(class = target, error = %err, "failed to write coverage matrix");
                    None
                }
            }
        } else {
            None
        };

        TargetCoverage {
            target: target.to_string(),
            criteria,
            total_goals,
            covered_goals,
            coverage: coverage_ratio(covered_goals, total_goals),
            bit_string,
            minimized_size: covering_tests.iter().filter(|&&c| c).count(),
            matrix_path,
        }
    }

    /// Re-run the outcome's class with `mutant` active and compare the
    /// failure count of the same test against the baseline.
    fn is_killed(
        &mut self,
        ctx: &mut ExecutionContext,
        mutant: MutantId,
        outcome: &TestOutcome,
        tests: &[TestClass],
        baseline: &[TestOutcome],
        cache: &mut RerunCache,
    ) -> bool {
        let Some(class) = tests.iter().find(|c| c.name == outcome.class_name()) else {
            return false;
        };
        let key = (class.name.clone(), mutant);
        if !cache.contains_key(&key) {
            ctx.clear_trace();
            let rerun = {
                let mut active = ctx.activate_mutant(mutant);
                self.backend.run(&mut *active, std::slice::from_ref(class))
            };
            let rerun = rerun.unwrap_or_else(|err| {
                warn!(
                    mutant = %mutant,
                    class = %class.name,
                    error = %err,
                    "mutant execution failed"
                );
                Vec::new()
            });
            cache.insert(key.clone(), rerun);
        }
        let Some(rerun) = cache.get(&key) else {
            return false;
        };
        if rerun.is_empty() {
            return false;
        }
        let killed = match rerun.iter().find(|o| o.identity == outcome.identity) {
            Some(mutated) => mutated.failure_count != outcome.failure_count,
            None => {
                let failures = |outcomes: &[TestOutcome]| -> usize {
                    outcomes
                        .iter()
                        .filter(|o| o.class_name() == class.name)
                        .map(|o| o.failure_count)
                        .sum()
                };
                failures(rerun) != failures(baseline)
            }
        };
        if killed {
            info!(mutant = %mutant, test = %outcome.identity, "mutation killed");
        }
        killed
    }

    fn track(&mut self, coverage: &TargetCoverage, report: &CoverageReport, started: Instant) {
        for c in &coverage.criteria {
            self.sink
                .track_output_variable(c.criterion.coverage_variable(), c.coverage.into());
            self.sink.track_output_variable(
                c.criterion.bit_string_variable(),
                c.bit_string.clone().into(),
            );
        }
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let values: [(RuntimeVariable, StatValue); 8] = [
            (RuntimeVariable::TotalGoals, coverage.total_goals.into()),
            (RuntimeVariable::CoveredGoals, coverage.covered_goals.into()),
            (RuntimeVariable::Coverage, coverage.coverage.into()),
            (RuntimeVariable::CoverageBitString, coverage.bit_string.clone().into()),
            (RuntimeVariable::TestsExecuted, report.tests_executed.into()),
            (RuntimeVariable::MinimizedSize, coverage.minimized_size.into()),
            (RuntimeVariable::TotalTime, elapsed.into()),
            (
                RuntimeVariable::ExplicitTypeExceptions,
                report.explicit_exceptions.len().into(),
            ),
        ];
        for (variable, value) in values {
            self.sink.track_output_variable(variable, value);
        }
    }
}
