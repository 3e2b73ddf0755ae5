//! Rendering candidate tests to source files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::{CandidateTest, GeneratedArtifact};

/// Writer errors.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Writer could not be started.
    #[error("cannot run writer {}: {source}", program.display())]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Writer exited unsuccessfully.
    #[error("writer failed with status {status:?}: {stderr}")]
    Failed {
        /// Exit code, if any.
        status: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },
    /// Writer output is not a list of artifacts.
    #[error("invalid writer output: {0}")]
    Parse(#[from] serde_json::Error),
    /// IO failure talking to the writer.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders candidate tests into a compilable suite.
pub trait SuiteWriter {
    /// Write the suite `name` containing `tests` into `dir` and return the
    /// produced sources with their roles.
    fn write_suite(
        &self,
        name: &str,
        tests: &[CandidateTest],
        dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, WriterError>;
}

impl<T: SuiteWriter + ?Sized> SuiteWriter for &T {
    fn write_suite(
        &self,
        name: &str,
        tests: &[CandidateTest],
        dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, WriterError> {
        (**self).write_suite(name, tests, dir)
    }
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    name: &'a str,
    dir: &'a Path,
    tests: &'a [CandidateTest],
}

/// Writer run as a child process.
///
/// The request goes to stdin as JSON (`name`, `dir`, `tests`); stdout must
/// be a JSON array of artifacts (`path`, `class_name`, `role`).
#[derive(Debug, Clone)]
pub struct CommandSuiteWriter {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSuiteWriter {
    /// Writer invoking `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra leading arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }
}

impl SuiteWriter for CommandSuiteWriter {
    fn write_suite(
        &self,
        name: &str,
        tests: &[CandidateTest],
        dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, WriterError> {
        let request = serde_json::to_vec(&WriteRequest { name, dir, tests })?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| WriterError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(WriterError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let artifacts: Vec<GeneratedArtifact> = serde_json::from_slice(&output.stdout)?;
        debug!(suite = name, artifacts = artifacts.len(), "suite written");
        Ok(artifacts)
    }
}
