//! External launcher process adapter.
//!
//! The launcher is any program that accepts
//! `--format junit4|junit5 --classpath <cp> [--instrument] [--mutant <id>] [--method <m>] <class>`
//! and prints one JSON [`RunEvent`] per line on stdout.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use super::junit4::NativeRunner;
use super::junit5::PlatformLauncher;
use super::{RunEvent, RunListener, RunnerError, TestFormat};
use crate::classes::TestClass;
use crate::context::{ExecutionContext, LoaderKind};
use crate::validate::classpath::{join_classpath, split_classpath};

/// Spawns the configured launcher once per class.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    extra_classpath: String,
}

impl ProcessLauncher {
    /// Launcher running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            extra_classpath: String::new(),
        }
    }

    /// Leading arguments passed before the generated ones.
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Classpath appended after the loader's own entries.
    pub fn with_classpath(mut self, classpath: impl Into<String>) -> Self {
        self.extra_classpath = classpath.into();
        self
    }

    /// Command line for one class execution.
    ///
    /// The classpath comes from the context loader, falling back to the
    /// code-under-test loader; instrumentation is requested only for an
    /// instrumenting loader.
    pub fn command(
        &self,
        ctx: &ExecutionContext,
        format: TestFormat,
        class: &TestClass,
        method: Option<&str>,
    ) -> Command {
        let loader = ctx.context_loader().unwrap_or(ctx.sut_loader());
        let mut entries = split_classpath(&loader.classpath_string());
        entries.extend(split_classpath(&self.extra_classpath));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--format")
            .arg(format.as_arg())
            .arg("--classpath")
            .arg(join_classpath(entries));
        if loader.kind() == LoaderKind::Instrumenting {
            cmd.arg("--instrument");
        }
        if let Some(mutant) = ctx.active_mutant() {
            cmd.arg("--mutant").arg(mutant.to_string());
        }
        if let Some(method) = method {
            cmd.arg("--method").arg(method);
        }
        cmd.arg(&class.name);
        cmd
    }

    fn launch(
        &self,
        ctx: &mut ExecutionContext,
        format: TestFormat,
        class: &TestClass,
        method: Option<&str>,
        listener: &mut dyn RunListener,
    ) -> Result<(), RunnerError> {
        let output = self
            .command(ctx, format, class, method)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RunnerError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut events = 0usize;
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(line) {
                Ok(event) => {
                    events += 1;
                    listener.on_event(ctx, event);
                }
                Err(err) => debug!(line, error = %err, "skipping non-event launcher output"),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if events == 0 {
                return Err(RunnerError::Launcher(format!(
                    "{} exited with {} for {}: {}",
                    self.program.display(),
                    output.status,
                    class.name,
                    stderr.trim()
                )));
            }
            warn!(
                class = %class.name,
                status = %output.status,
                stderr = %stderr.trim(),
                "launcher exited unsuccessfully"
            );
        }
        Ok(())
    }
}

impl NativeRunner for ProcessLauncher {
    fn run_class(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: Option<&str>,
        listener: &mut dyn RunListener,
    ) -> Result<(), RunnerError> {
        self.launch(ctx, TestFormat::Junit4, class, method, listener)
    }
}

impl PlatformLauncher for ProcessLauncher {
    fn execute(
        &mut self,
        ctx: &mut ExecutionContext,
        class: &TestClass,
        method: Option<&str>,
        listener: &mut dyn RunListener,
    ) -> Result<(), RunnerError> {
        self.launch(ctx, TestFormat::Junit5, class, method, listener)
    }
}
