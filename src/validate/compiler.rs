//! Compiling rendered suites with a system compiler.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, error, warn};

use super::GeneratedArtifact;

/// Compiler errors.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// Compiler could not be started.
    #[error("cannot run compiler {}: {source}", program.display())]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Source file listed by the writer is missing.
    #[error("generated source {} does not exist", .0.display())]
    MissingSource(PathBuf),
    /// Compilation reported errors.
    #[error("compilation failed with {} diagnostic(s)", diagnostics.len())]
    Failed {
        /// Parsed diagnostics.
        diagnostics: Vec<Diagnostic>,
    },
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source file, if the message names one.
    pub file: Option<String>,
    /// Line in `file`.
    pub line: Option<u32>,
    /// Message text without location and severity.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: {}", self.message),
            (Some(file), None) => write!(f, "{file}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl Diagnostic {
    /// Output-directory permission problems do not invalidate the sources.
    pub fn is_benign(&self) -> bool {
        self.message.starts_with("error while writing")
    }
}

/// Parse `file:line: error: message` lines; continuation lines are dropped.
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    stderr
        .lines()
        .filter_map(|line| {
            if let Some(message) = line.strip_prefix("error: ") {
                return Some(Diagnostic {
                    file: None,
                    line: None,
                    message: message.trim().to_string(),
                });
            }
            let (location, message) = line.split_once(": error: ")?;
            let (file, line_no) = match location.rsplit_once(':') {
                Some((file, n)) => match n.parse().ok() {
                    Some(n) => (file.to_string(), Some(n)),
                    None => (location.to_string(), None),
                },
                None => (location.to_string(), None),
            };
            Some(Diagnostic {
                file: Some(file),
                line: line_no,
                message: message.trim().to_string(),
            })
        })
        .collect()
}

/// Turns rendered sources into loadable classes.
pub trait Compiler {
    /// Whether the compiler can be used at all.
    fn is_available(&self) -> bool;

    /// Compile `sources` against `classpath` into `out_dir`.
    ///
    /// Returns one artifact per source, pointing at the compiled class and
    /// keeping the source's role.
    fn compile(
        &self,
        sources: &[GeneratedArtifact],
        classpath: &str,
        out_dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, CompilerError>;
}

impl<T: Compiler + ?Sized> Compiler for &T {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn compile(
        &self,
        sources: &[GeneratedArtifact],
        classpath: &str,
        out_dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, CompilerError> {
        (**self).compile(sources, classpath, out_dir)
    }
}

/// Class file written by the compiler for `class_name` under `out_dir`.
pub fn class_file(out_dir: &Path, class_name: &str) -> PathBuf {
    let mut path = out_dir.to_path_buf();
    for segment in class_name.split('.') {
        path.push(segment);
    }
    path.set_extension("class");
    path
}

/// `javac`-compatible compiler run as a child process.
#[derive(Debug, Clone)]
pub struct JavacCompiler {
    program: PathBuf,
    args: Vec<String>,
}

impl Default for JavacCompiler {
    fn default() -> Self {
        Self::new("javac")
    }
}

impl JavacCompiler {
    /// Compiler invoking `program`.
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

    fn log_failure(
        &self,
        sources: &[GeneratedArtifact],
        classpath: &str,
        diagnostics: &[Diagnostic],
    ) {
        error!(program = %self.program.display(), "compilation failed");
        error!(classpath, "compilation classpath");
        for diagnostic in diagnostics {
            error!(%diagnostic, "diagnostic");
        }
        for source in sources {
            match std::fs::read_to_string(&source.path) {
                Ok(text) => {
                    let listing: String = text
                        .lines()
                        .enumerate()
                        .map(|(i, line)| format!("{}: {line}\n", i + 1))
                        .collect();
                    error!(source = %source.path.display(), "\n{listing}");
                }
                Err(err) => {
                    warn!(source = %source.path.display(), error = %err, "cannot read source")
                }
            }
        }
    }
}

impl Compiler for JavacCompiler {
    fn is_available(&self) -> bool {
        match Command::new(&self.program).arg("-version").output() {
            Ok(output) => output.status.success(),
            Err(err) => {
                debug!(program = %self.program.display(), error = %err, "compiler unavailable");
                false
            }
        }
    }

    fn compile(
        &self,
        sources: &[GeneratedArtifact],
        classpath: &str,
        out_dir: &Path,
    ) -> Result<Vec<GeneratedArtifact>, CompilerError> {
        if let Some(missing) = sources.iter().find(|s| !s.path.is_file()) {
            error!(
                source = %missing.path.display(),
                "supposed to compile a source that does not exist"
            );
            return Err(CompilerError::MissingSource(missing.path.clone()));
        }

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("-classpath")
            .arg(classpath)
            .arg("-d")
            .arg(out_dir)
            .args(sources.iter().map(|s| &s.path))
            .output()
            .map_err(|source| CompilerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let compiled = || -> Vec<GeneratedArtifact> {
            sources
                .iter()
                .map(|s| GeneratedArtifact {
                    path: class_file(out_dir, &s.class_name),
                    class_name: s.class_name.clone(),
                    role: s.role,
                })
                .collect()
        };

        if output.status.success() {
            return Ok(compiled());
        }

        let diagnostics = parse_diagnostics(&String::from_utf8_lossy(&output.stderr));
        if !diagnostics.is_empty() && diagnostics.iter().all(Diagnostic::is_benign) {
            error!("compiler could not write its output, ignoring");
            return Ok(compiled());
        }
        self.log_failure(sources, classpath, &diagnostics);
        Err(CompilerError::Failed { diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_keep_location_and_message() {
        let stderr = "\
/tmp/x/Foo_0_tmp_ESTest.java:12: error: cannot find symbol
    foo.bar();
       ^
error: error while writing Foo_0_tmp_ESTest: Permission denied
1 error
";
        let diagnostics = parse_diagnostics(stderr);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics[0].file.as_deref(),
            Some("/tmp/x/Foo_0_tmp_ESTest.java")
        );
        assert_eq!(diagnostics[0].line, Some(12));
        assert_eq!(diagnostics[0].message, "cannot find symbol");
        assert!(!diagnostics[0].is_benign());
        assert!(diagnostics[1].is_benign());
    }

    #[test]
    fn nested_write_error_is_benign() {
        let diagnostics = parse_diagnostics(
            "Foo.java:1: error: error while writing Foo: /out/Foo.class (Read-only file system)\n",
        );
        assert!(diagnostics[0].is_benign());
        assert_eq!(
            diagnostics[0].to_string(),
            "Foo.java:1: error while writing Foo: /out/Foo.class (Read-only file system)"
        );
    }

    #[test]
    fn class_files_follow_packages() {
        assert_eq!(
            class_file(Path::new("/out"), "com.example.FooTest"),
            PathBuf::from("/out/com/example/FooTest.class")
        );
    }

    #[test]
    fn missing_program_is_unavailable() {
        let compiler = JavacCompiler::new("/definitely/not/a/compiler");
        assert!(!compiler.is_available());
    }

    #[cfg(unix)]
    fn failing_compiler(dir: &Path, stderr: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("javac.sh");
        let body = format!("#!/bin/sh\ncat >&2 <<'EOF'\n{stderr}EOF\nexit 1\n");
        std::fs::write(&path, body).expect("script should be written");
        let mut perms = std::fs::metadata(&path)
            .expect("script metadata should load")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("script should be executable");
        path
    }

    #[cfg(unix)]
    fn source(dir: &Path) -> GeneratedArtifact {
        let path = dir.join("Foo_0_tmp_ESTest.java");
        std::fs::write(&path, "public class Foo_0_tmp_ESTest {}").expect("source should be written");
        GeneratedArtifact {
            path,
            class_name: "Foo_0_tmp_ESTest".to_string(),
            role: crate::classes::ArtifactRole::Test,
        }
    }

    #[cfg(unix)]
    #[test]
    fn write_error_alone_is_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let program = failing_compiler(
            tmp.path(),
            "error: error while writing Foo_0_tmp_ESTest: Permission denied\n1 error\n",
        );
        let compiled = JavacCompiler::new(program)
            .compile(&[source(tmp.path())], "", tmp.path())
            .expect("write error alone should not fail compilation");
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].class_name, "Foo_0_tmp_ESTest");
    }

    #[cfg(unix)]
    #[test]
    fn write_error_does_not_mask_a_real_error() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let program = failing_compiler(
            tmp.path(),
            "Foo_0_tmp_ESTest.java:3: error: cannot find symbol\n\
             error: error while writing Foo_0_tmp_ESTest: Permission denied\n2 errors\n",
        );
        let err = JavacCompiler::new(program)
            .compile(&[source(tmp.path())], "", tmp.path())
            .expect_err("real error should fail compilation");
        let CompilerError::Failed { diagnostics } = err else {
            panic!("expected a compilation failure");
        };
        assert_eq!(diagnostics.len(), 2);
        assert!(!diagnostics[0].is_benign());
    }

    #[cfg(unix)]
    #[test]
    fn failure_without_diagnostics_is_not_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let program = failing_compiler(tmp.path(), "");
        let err = JavacCompiler::new(program)
            .compile(&[source(tmp.path())], "", tmp.path())
            .expect_err("silent failure should fail compilation");
        assert!(matches!(err, CompilerError::Failed { ref diagnostics } if diagnostics.is_empty()));
    }
}
