use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use suite_oracle::budget::{Deadline, TimeBudget, Unlimited, install_interrupt_handler};
use suite_oracle::classes::{ClassIndex, ManifestIndex};
use suite_oracle::config::OracleConfig;
use suite_oracle::context::{ExecutionContext, LoaderHandle, ManagedSandbox};
use suite_oracle::coverage::{
    CoverageAnalyzer, Criterion, ManifestGoalFactory, ReportFormat, TestOrdering, discover_tests,
    order_tests, render_report, resolve_targets,
};
use suite_oracle::mutant::MutantPool;
use suite_oracle::runner::junit4::Junit4Backend;
use suite_oracle::runner::junit5::Junit5Backend;
use suite_oracle::runner::mutation::MutationAwareRunner;
use suite_oracle::runner::process::ProcessLauncher;
use suite_oracle::runner::{TestExecutionBackend, TestFormat};
use suite_oracle::stats::JsonlStatisticsSink;
use suite_oracle::validate::classpath::split_classpath;
use suite_oracle::validate::{CandidateTest, CommandSuiteWriter, JavacCompiler, StabilityValidator};

#[derive(Debug, Parser)]
#[command(name = "suite-oracle")]
#[command(about = "Coverage, mutation and stability analysis of generated test suites")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Target class, or a jar or directory of targets.
    #[arg(long, global = true)]
    target: Option<String>,
    /// `:`-separated test classes, prefixes or paths.
    #[arg(long, global = true)]
    test_prefix: Option<String>,
    /// Instrumentation manifest.
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,
    /// Launcher program.
    #[arg(long, global = true)]
    launcher: Option<PathBuf>,
    /// Framework generation.
    #[arg(long, global = true, value_enum)]
    junit: Option<JunitArg>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Measure the coverage of existing tests.
    Coverage {
        /// Criterion to analyze; repeat for several.
        #[arg(long = "criterion")]
        criteria: Vec<Criterion>,
        /// Write the coverage matrix.
        #[arg(long)]
        matrix: bool,
        /// Report directory.
        #[arg(long)]
        report_dir: Option<PathBuf>,
        /// Test execution order.
        #[arg(long, value_enum)]
        ordering: Option<OrderingArg>,
        /// Output format.
        #[arg(long, value_enum, default_value = "md")]
        format: OutputFormat,
    },
    /// Compile and stability-filter a candidate pool.
    Validate {
        /// JSON array of candidate tests.
        candidates: PathBuf,
        /// Where to write the filtered pool; defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Number of executions of the compiled suite.
        #[arg(long)]
        executions: Option<usize>,
        /// Time budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run mutation analysis over the discovered tests.
    Mutate {
        /// Emit JSON output.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Markdown
    Md,
    /// JSON
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum JunitArg {
    /// Runner-based execution
    Junit4,
    /// Platform-based execution
    Junit5,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderingArg {
    /// Longest class name first
    NameLength,
    /// By class name
    Lexicographic,
    /// As discovered
    Discovery,
}

fn make_config(cli: &Cli) -> Result<OracleConfig> {
    let mut config = match &cli.config {
        Some(path) => OracleConfig::load(path)?,
        None => OracleConfig::default(),
    };
    if let Some(target) = &cli.target {
        config = config.with_target_class(target.clone());
    }
    if let Some(prefix) = &cli.test_prefix {
        config = config.with_test_prefix(prefix.clone());
    }
    if let Some(manifest) = &cli.manifest {
        config = config.with_manifest(manifest.clone());
    }
    if let Some(launcher) = &cli.launcher {
        config = config.with_launcher(launcher.clone());
    }
    if let Some(junit) = cli.junit {
        config = config.with_format(match junit {
            JunitArg::Junit4 => TestFormat::Junit4,
            JunitArg::Junit5 => TestFormat::Junit5,
        });
    }
    Ok(config)
}

fn init_logging(config: &OracleConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn make_backend(config: &OracleConfig) -> Box<dyn TestExecutionBackend> {
    let launcher = ProcessLauncher::new(config.launcher.program.clone())
        .with_args(config.launcher.args.clone())
        .with_classpath(config.classpath.generator.clone());
    match config.launcher.format {
        TestFormat::Junit4 => Box::new(Junit4Backend::new(launcher)),
        TestFormat::Junit5 => Box::new(Junit5Backend::new(launcher)),
    }
}

fn make_context(config: &OracleConfig) -> ExecutionContext {
    let sut = LoaderHandle::instrumenting(
        split_classpath(&config.classpath.target_project)
            .into_iter()
            .map(PathBuf::from),
    );
    ExecutionContext::new(sut, Box::new(ManagedSandbox::default()))
}

fn load_index(path: &Path) -> Result<ManifestIndex> {
    ManifestIndex::load(path).with_context(|| format!("loading manifest {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = make_config(&cli)?;
    init_logging(&config);
    install_interrupt_handler()?;

    match cli.command {
        Command::Coverage {
            criteria,
            matrix,
            report_dir,
            ordering,
            format,
        } => {
            if !criteria.is_empty() {
                config = config.with_criteria(criteria);
            }
            if matrix {
                config = config.with_coverage_matrix(true);
            }
            if let Some(dir) = report_dir {
                config = config.with_report_dir(dir);
            }
            if let Some(ordering) = ordering {
                config = config.with_ordering(match ordering {
                    OrderingArg::NameLength => TestOrdering::NameLengthDescending,
                    OrderingArg::Lexicographic => TestOrdering::Lexicographic,
                    OrderingArg::Discovery => TestOrdering::Discovery,
                });
            }

            let index = load_index(&config.manifest)?;
            let goals = ManifestGoalFactory::new(index.clone());
            let mut backend = make_backend(&config);
            let mut sink = JsonlStatisticsSink::new(config.coverage.statistics_path());
            let mut ctx = make_context(&config);

            let report =
                CoverageAnalyzer::new(&config, &index, &goals, backend.as_mut(), &mut sink)
                    .analyze(&mut ctx);
            sink.write_pending()?;

            let format = match format {
                OutputFormat::Md => ReportFormat::Markdown,
                OutputFormat::Json => ReportFormat::Json,
            };
            println!("{}", render_report(&report, format));
            if report.is_empty() {
                std::process::exit(1);
            }
        }
        Command::Validate {
            candidates,
            output,
            executions,
            timeout_secs,
        } => {
            if let Some(executions) = executions {
                config = config.with_executions(executions);
            }
            if let Some(secs) = timeout_secs {
                config = config.with_time_budget_secs(secs);
            }

            let raw = fs::read_to_string(&candidates)
                .with_context(|| format!("reading candidates {}", candidates.display()))?;
            let mut tests: Vec<CandidateTest> = serde_json::from_str(&raw)?;
            let budget: Box<dyn TimeBudget> = match config.stability.time_budget_secs {
                Some(secs) => Box::new(Deadline::after(Duration::from_secs(secs))),
                None => Box::new(Unlimited),
            };
            let writer = CommandSuiteWriter::new(config.writer.program.clone())
                .with_args(config.writer.args.clone());
            let compiler = JavacCompiler::new(config.compiler.program.clone())
                .with_args(config.compiler.args.clone());
            let mut backend = make_backend(&config);
            let mut ctx = make_context(&config);

            let mut validator = StabilityValidator::new(
                &config,
                &writer,
                &compiler,
                backend.as_mut(),
                &*budget,
            );
            if !validator.is_compiler_available() {
                anyhow::bail!(
                    "compiler {} is not available",
                    config.compiler.program.display()
                );
            }
            let before = tests.len();
            let compiled = validator.remove_tests_that_do_not_compile(&mut tests);
            let stability = validator.handle_tests_that_are_unstable(&mut tests, &mut ctx);

            let pool = serde_json::to_string_pretty(&tests)?;
            match output {
                Some(path) => fs::write(&path, pool)
                    .with_context(|| format!("writing pool {}", path.display()))?,
                None => println!("{pool}"),
            }
            eprintln!(
                "candidates: {before}, not compiling: {}, unchecked: {}, unstable: {}, kept: {}",
                compiled.removed.len(),
                compiled.unchecked.len(),
                stability.unstable,
                tests.len()
            );
        }
        Command::Mutate { json } => {
            let index = load_index(&config.manifest)?;
            let mut backend = make_backend(&config);
            let mut ctx = make_context(&config);
            let sut = ctx.sut_loader().clone();
            ctx.set_mutant_pool(&sut, MutantPool::new(index.mutants()));

            let targets = resolve_targets(&index, &config.target.class)?;
            let mut tests = discover_tests(&index, &config.target.test_prefix, &targets);
            order_tests(&mut tests, config.coverage.ordering);

            let mut runner = MutationAwareRunner::new(ctx.mutant_pool().ids());
            let mut records = Vec::new();
            for class in &tests {
                match runner.run(backend.as_mut(), &mut ctx, class) {
                    Ok(class_records) => records.extend(class_records),
                    Err(err) => {
                        warn!(class = %class.name, error = %err, "mutation analysis failed");
                    }
                }
            }

            if json {
                let output = serde_json::json!({
                    "tests": records,
                    "live": runner.live(),
                    "killed": runner.killed(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                for record in &records {
                    for id in &record.killed {
                        println!("killed\t{id}\t{}", record.test);
                    }
                }
                for id in runner.live() {
                    let label = ctx
                        .mutant_pool()
                        .get(*id)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| id.to_string());
                    println!("live\t{id}\t{label}");
                }
                println!(
                    "summary: killed={}, live={}",
                    runner.killed().len(),
                    runner.live().len()
                );
            }
        }
    }

    Ok(())
}
