//! Loading compiled suites.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::GeneratedArtifact;
use crate::classes::{ArtifactRole, TestClass};
use crate::context::LoaderHandle;

/// Load errors.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Compiled class file is missing.
    #[error("class {class_name} not found at {}", path.display())]
    Missing {
        /// Expected class.
        class_name: String,
        /// Expected file.
        path: PathBuf,
    },
    /// No test class among the artifacts.
    #[error("found no test classes among compiled artifacts")]
    NoTests,
    /// Directory walk failed.
    #[error("cannot scan {}: {source}", dir.display())]
    Walk {
        /// Scanned directory.
        dir: PathBuf,
        /// Underlying error.
        source: walkdir::Error,
    },
}

/// Classes of one compiled suite, in load order.
#[derive(Debug, Clone)]
pub struct LoadedSuite {
    /// Loader owning every class of the suite.
    pub loader: LoaderHandle,
    /// Scaffolding classes, loaded first.
    pub scaffolding: Vec<String>,
    /// Executable test classes.
    pub tests: Vec<TestClass>,
    /// Every other class found in the output directory.
    pub support: Vec<String>,
}

impl LoadedSuite {
    /// Every loaded class name in load order.
    pub fn load_order(&self) -> Vec<&str> {
        self.scaffolding
            .iter()
            .map(String::as_str)
            .chain(self.tests.iter().map(|t| t.name.as_str()))
            .chain(self.support.iter().map(String::as_str))
            .collect()
    }
}

fn class_name_of(dir: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(dir).ok()?.with_extension("");
    let segments: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(segments.join("."))
}

/// Load a compiled suite from `dir` into a fresh non-instrumenting loader.
///
/// Scaffolding comes first so that tests depending on it resolve, then the
/// tests, then any remaining `.class` file in `dir` (inner and anonymous
/// classes the writer did not list).
pub fn load_suite(dir: &Path, compiled: &[GeneratedArtifact]) -> Result<LoadedSuite, LoadError> {
    let loader = LoaderHandle::non_instrumenting([dir.to_path_buf()]);

    let ensure = |artifact: &GeneratedArtifact| -> Result<(), LoadError> {
        if artifact.path.is_file() {
            debug!(class = %artifact.class_name, "loading class");
            Ok(())
        } else {
            Err(LoadError::Missing {
                class_name: artifact.class_name.clone(),
                path: artifact.path.clone(),
            })
        }
    };

    let mut scaffolding = Vec::new();
    for artifact in compiled.iter().filter(|a| a.role == ArtifactRole::Scaffolding) {
        ensure(artifact)?;
        scaffolding.push(artifact.class_name.clone());
    }

    let mut tests = Vec::new();
    for artifact in compiled.iter().filter(|a| a.role == ArtifactRole::Test) {
        ensure(artifact)?;
        tests.push(TestClass::new(artifact.class_name.clone()).with_loader(loader.clone()));
    }
    if tests.is_empty() {
        return Err(LoadError::NoTests);
    }

    let mut support: Vec<String> = compiled
        .iter()
        .filter(|a| a.role == ArtifactRole::Support)
        .map(|a| a.class_name.clone())
        .collect();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| LoadError::Walk {
            dir: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "class") {
            continue;
        }
        let Some(name) = class_name_of(dir, path) else {
            continue;
        };
        let known = scaffolding.contains(&name)
            || support.contains(&name)
            || tests.iter().any(|t| t.name == name);
        if !known {
            debug!(class = %name, "loading remaining generated class");
            support.push(name);
        }
    }

    info!(
        scaffolding = scaffolding.len(),
        tests = tests.len(),
        support = support.len(),
        "loaded compiled suite"
    );
    Ok(LoadedSuite {
        loader,
        scaffolding,
        tests,
        support,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::context::LoaderKind;

    fn touch(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("package dir should be created");
        }
        std::fs::write(&path, b"\xca\xfe\xba\xbe").expect("class should be written");
        path
    }

    fn artifact(path: PathBuf, class_name: &str, role: ArtifactRole) -> GeneratedArtifact {
        GeneratedArtifact {
            path,
            class_name: class_name.to_string(),
            role,
        }
    }

    #[test]
    fn scaffolding_loads_before_tests_and_inner_classes_are_found() {
        let tmp = tempdir().expect("tempdir should be created");
        let test = touch(tmp.path(), "com/example/Foo_0_tmp_ESTest.class");
        let scaffolding = touch(tmp.path(), "com/example/Foo_0_tmp_ESTest_scaffolding.class");
        touch(tmp.path(), "com/example/Foo_0_tmp_ESTest$1.class");
        std::fs::write(tmp.path().join("com/example/notes.txt"), "x")
            .expect("file should be written");

        let suite = load_suite(
            tmp.path(),
            &[
                artifact(test, "com.example.Foo_0_tmp_ESTest", ArtifactRole::Test),
                artifact(
                    scaffolding,
                    "com.example.Foo_0_tmp_ESTest_scaffolding",
                    ArtifactRole::Scaffolding,
                ),
            ],
        )
        .expect("suite should load");

        assert_eq!(
            suite.load_order(),
            vec![
                "com.example.Foo_0_tmp_ESTest_scaffolding",
                "com.example.Foo_0_tmp_ESTest",
                "com.example.Foo_0_tmp_ESTest$1",
            ]
        );
        assert_eq!(suite.loader.kind(), LoaderKind::NonInstrumenting);
        assert_eq!(
            suite.tests[0].loader.as_ref().map(LoaderHandle::id),
            Some(suite.loader.id())
        );
    }

    #[test]
    fn missing_class_file_is_an_error() {
        let tmp = tempdir().expect("tempdir should be created");
        let err = load_suite(
            tmp.path(),
            &[artifact(tmp.path().join("T.class"), "T", ArtifactRole::Test)],
        )
        .expect_err("missing class should fail");
        assert!(matches!(err, LoadError::Missing { .. }));
    }

    #[test]
    fn suite_without_tests_is_an_error() {
        let tmp = tempdir().expect("tempdir should be created");
        assert!(matches!(load_suite(tmp.path(), &[]), Err(LoadError::NoTests)));
    }
}
