//! Oracle configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coverage::criterion::Criterion;
use crate::coverage::discovery::TestOrdering;
use crate::runner::TestFormat;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO failure.
    #[error("io error reading {}: {source}", path.display())]
    Io {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Malformed TOML.
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

/// What is under test and where its tests live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    /// Target class name, or a jar or directory to expand.
    pub class: String,
    /// `:`-separated test class names, prefixes or paths.
    pub test_prefix: String,
    /// Package prefix of the project.
    pub class_prefix: String,
    /// Suffix of generated test class names.
    pub junit_suffix: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            class: String::new(),
            test_prefix: String::new(),
            class_prefix: String::new(),
            junit_suffix: "ESTest".to_string(),
        }
    }
}

/// Classpaths used for execution and compilation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClasspathConfig {
    /// Classpath of the project under test.
    pub target_project: String,
    /// Classpath of the generator runtime.
    pub generator: String,
    /// File name marker of pathing jars.
    pub pathing_marker: String,
}

impl Default for ClasspathConfig {
    fn default() -> Self {
        Self {
            target_project: String::new(),
            generator: String::new(),
            pathing_marker: "pathing".to_string(),
        }
    }
}

/// External program invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgramConfig {
    /// Program to run.
    pub program: PathBuf,
    /// Leading arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProgramConfig {
    fn named(program: &str) -> Self {
        Self {
            program: PathBuf::from(program),
            args: Vec::new(),
        }
    }
}

/// Test launcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Launcher program.
    pub program: PathBuf,
    /// Leading arguments.
    pub args: Vec<String>,
    /// Framework generation to drive.
    pub format: TestFormat,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("suite-launcher"),
            args: Vec::new(),
            format: TestFormat::default(),
        }
    }
}

/// Coverage analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CoverageConfig {
    /// Criteria to analyze, in report order.
    pub criteria: Vec<Criterion>,
    /// Write the coverage matrix.
    pub matrix: bool,
    /// Report directory.
    pub report_dir: PathBuf,
    /// Execution order of discovered tests.
    pub ordering: TestOrdering,
    /// Statistics output; defaults to `<report_dir>/statistics.jsonl`.
    pub statistics: Option<PathBuf>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            criteria: vec![Criterion::Branch],
            matrix: false,
            report_dir: PathBuf::from("suite-report"),
            ordering: TestOrdering::default(),
            statistics: None,
        }
    }
}

impl CoverageConfig {
    /// Resolved statistics file.
    pub fn statistics_path(&self) -> PathBuf {
        self.statistics
            .clone()
            .unwrap_or_else(|| self.report_dir.join("statistics.jsonl"))
    }
}

/// Stability validation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StabilityConfig {
    /// How often the compiled suite is executed.
    pub executions: usize,
    /// Wall-clock budget for validation; unlimited when absent.
    pub time_budget_secs: Option<u64>,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            executions: 1,
            time_budget_secs: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Target settings.
    pub target: TargetConfig,
    /// Classpaths.
    pub classpath: ClasspathConfig,
    /// Test launcher.
    pub launcher: LauncherConfig,
    /// Source compiler.
    pub compiler: ProgramConfig,
    /// Test renderer.
    pub writer: ProgramConfig,
    /// Coverage analysis.
    pub coverage: CoverageConfig,
    /// Stability validation.
    pub stability: StabilityConfig,
    /// Instrumentation manifest.
    pub manifest: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            classpath: ClasspathConfig::default(),
            launcher: LauncherConfig::default(),
            compiler: ProgramConfig::named("javac"),
            writer: ProgramConfig::named("suite-writer"),
            coverage: CoverageConfig::default(),
            stability: StabilityConfig::default(),
            manifest: PathBuf::from("manifest.json"),
            log_level: "info".to_string(),
        }
    }
}

impl OracleConfig {
    /// Read a TOML file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set target class or path.
    pub fn with_target_class(mut self, class: impl Into<String>) -> Self {
        self.target.class = class.into();
        self
    }

    /// Set test prefix list.
    pub fn with_test_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.target.test_prefix = prefix.into();
        self
    }

    /// Set generated test suffix.
    pub fn with_junit_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.target.junit_suffix = suffix.into();
        self
    }

    /// Set project classpath.
    pub fn with_target_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.classpath.target_project = classpath.into();
        self
    }

    /// Set generator classpath.
    pub fn with_generator_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.classpath.generator = classpath.into();
        self
    }

    /// Set launcher program.
    pub fn with_launcher(mut self, program: impl Into<PathBuf>) -> Self {
        self.launcher.program = program.into();
        self
    }

    /// Set framework generation.
    pub fn with_format(mut self, format: TestFormat) -> Self {
        self.launcher.format = format;
        self
    }

    /// Set compiler program.
    pub fn with_compiler(mut self, program: impl Into<PathBuf>) -> Self {
        self.compiler.program = program.into();
        self
    }

    /// Set writer program.
    pub fn with_writer(mut self, program: impl Into<PathBuf>) -> Self {
        self.writer.program = program.into();
        self
    }

    /// Set criteria.
    pub fn with_criteria(mut self, criteria: impl IntoIterator<Item = Criterion>) -> Self {
        self.coverage.criteria = criteria.into_iter().collect();
        self
    }

    /// Enable or disable matrix output.
    pub fn with_coverage_matrix(mut self, enabled: bool) -> Self {
        self.coverage.matrix = enabled;
        self
    }

    /// Set report directory.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.coverage.report_dir = dir.into();
        self
    }

    /// Set test ordering.
    pub fn with_ordering(mut self, ordering: TestOrdering) -> Self {
        self.coverage.ordering = ordering;
        self
    }

    /// Set number of stability executions.
    pub fn with_executions(mut self, executions: usize) -> Self {
        self.stability.executions = executions;
        self
    }

    /// Set validation budget.
    pub fn with_time_budget_secs(mut self, secs: u64) -> Self {
        self.stability.time_budget_secs = Some(secs);
        self
    }

    /// Set manifest path.
    pub fn with_manifest(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.manifest = manifest.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn defaults_and_builder_overrides_work() {
        let default = OracleConfig::default();
        assert_eq!(default.coverage.criteria, vec![Criterion::Branch]);
        assert_eq!(default.stability.executions, 1);
        assert_eq!(
            default.coverage.statistics_path(),
            PathBuf::from("suite-report/statistics.jsonl")
        );

        let cfg = OracleConfig::default()
            .with_target_class("com.example.Foo")
            .with_test_prefix("com.example.FooTest")
            .with_criteria([Criterion::Line, Criterion::Mutation])
            .with_coverage_matrix(true)
            .with_ordering(TestOrdering::Lexicographic)
            .with_executions(3)
            .with_format(TestFormat::Junit5);
        assert_eq!(cfg.target.class, "com.example.Foo");
        assert_eq!(cfg.coverage.criteria, vec![Criterion::Line, Criterion::Mutation]);
        assert!(cfg.coverage.matrix);
        assert_eq!(cfg.stability.executions, 3);
        assert_eq!(cfg.launcher.format, TestFormat::Junit5);
    }

    #[test]
    fn toml_file_overrides_selected_keys() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("oracle.toml");
        std::fs::write(
            &path,
            r#"
log_level = "debug"

[target]
class = "com.example.Foo"
test_prefix = "com.example."

[launcher]
program = "/opt/launcher"
args = ["--quiet"]
format = "junit5"

[coverage]
criteria = ["branch", "strong-mutation"]
matrix = true
ordering = "lexicographic"
"#,
        )
        .expect("config should be written");

        let cfg = OracleConfig::load(&path).expect("config should load");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.target.junit_suffix, "ESTest");
        assert_eq!(cfg.launcher.program, PathBuf::from("/opt/launcher"));
        assert_eq!(cfg.launcher.args, vec!["--quiet"]);
        assert_eq!(cfg.launcher.format, TestFormat::Junit5);
        assert_eq!(
            cfg.coverage.criteria,
            vec![Criterion::Branch, Criterion::StrongMutation]
        );
        assert_eq!(cfg.coverage.ordering, TestOrdering::Lexicographic);
        assert_eq!(cfg.compiler.program, PathBuf::from("javac"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[coverage\n").expect("config should be written");
        assert!(matches!(
            OracleConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            OracleConfig::load(&tmp.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
