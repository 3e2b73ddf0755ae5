//! Test class metadata, the test-class predicate and the class index.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::LoaderHandle;
use crate::mutant::Mutant;

/// JUnit 4 test annotation.
pub const JUNIT4_TEST_ANNOTATION: &str = "org.junit.Test";
/// JUnit 5 test annotation.
pub const JUPITER_TEST_ANNOTATION: &str = "org.junit.jupiter.api.Test";
/// Legacy JUnit 3 base class.
pub const LEGACY_TEST_CASE: &str = "junit.framework.TestCase";

/// Class index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed manifest.
    #[error("manifest parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Path is not known to the index.
    #[error("no classes found under {}", .0.display())]
    UnknownPath(PathBuf),
}

/// Role of a generated artifact, assigned when it is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    /// Class containing test methods.
    Test,
    /// Shared setup and teardown the tests depend on.
    Scaffolding,
    /// Any other generated class (inner, anonymous, helpers).
    Support,
}

/// Reflective view of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    /// Method name.
    pub name: String,
    /// Declared public.
    #[serde(default = "default_true")]
    pub public: bool,
    /// Declared `void`.
    #[serde(default = "default_true")]
    pub returns_void: bool,
    /// Number of declared parameters.
    #[serde(default)]
    pub parameter_count: usize,
    /// Fully qualified annotation names.
    #[serde(default)]
    pub annotations: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl MethodInfo {
    /// Public, void, no-argument method with the given annotations.
    pub fn new(name: impl Into<String>, annotations: &[&str]) -> Self {
        Self {
            name: name.into(),
            public: true,
            returns_void: true,
            parameter_count: 0,
            annotations: annotations.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn is_runnable(&self) -> bool {
        self.public && self.returns_void && self.parameter_count == 0
    }

    /// Annotated, runnable test method.
    pub fn is_annotated_test(&self) -> bool {
        self.is_runnable()
            && self
                .annotations
                .iter()
                .any(|a| a == JUNIT4_TEST_ANNOTATION || a == JUPITER_TEST_ANNOTATION)
    }
}

/// A class that may hold tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestClass {
    /// Fully qualified name.
    pub name: String,
    /// Declared abstract.
    #[serde(default)]
    pub is_abstract: bool,
    /// All superclasses, nearest first.
    #[serde(default)]
    pub superclasses: Vec<String>,
    /// Declared methods.
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
    /// Loader the class was loaded through. `None` means the code-under-test loader.
    #[serde(skip)]
    pub loader: Option<LoaderHandle>,
}

impl TestClass {
    /// Concrete class without methods or superclasses.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_abstract: false,
            superclasses: Vec::new(),
            methods: Vec::new(),
            loader: None,
        }
    }

    /// Add a method.
    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a superclass.
    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclasses.push(superclass.into());
        self
    }

    /// Attach the loader the class was loaded through.
    pub fn with_loader(mut self, loader: LoaderHandle) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Transitively extends the legacy test case base class.
    pub fn extends_legacy_test_case(&self) -> bool {
        self.superclasses.iter().any(|s| s == LEGACY_TEST_CASE)
    }

    /// Simple name without package.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Names of runnable test methods, declaration order.
    pub fn test_methods(&self) -> Vec<String> {
        let legacy = self.extends_legacy_test_case();
        let mut names: Vec<String> = Vec::new();
        for method in &self.methods {
            let is_test = method.is_annotated_test()
                || (legacy && method.is_runnable() && method.name.starts_with("test"));
            if is_test && !names.contains(&method.name) {
                names.push(method.name.clone());
            }
        }
        names
    }
}

/// Whether `class` should be executed as a test class.
///
/// Conservative: anything not clearly a test is rejected.
pub fn is_test_class(class: &TestClass) -> bool {
    if class.is_abstract {
        return false;
    }
    class.methods.iter().any(MethodInfo::is_annotated_test) || class.extends_legacy_test_case()
}

/// Classpath lookup and dependency analysis.
pub trait ClassIndex {
    /// Exact lookup by fully qualified name.
    fn find_class(&self, name: &str) -> Option<TestClass>;

    /// All classes whose name starts with `prefix`.
    fn classes_with_prefix(&self, prefix: &str) -> Vec<TestClass>;

    /// Names of all classes reachable from a jar or directory.
    fn classes_in_path(&self, path: &Path) -> Result<Vec<String>, IndexError>;

    /// Mutants of the code under test.
    fn mutants(&self) -> Vec<Mutant> {
        Vec::new()
    }
}

/// One class as described by the instrumentation manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Reflective metadata.
    #[serde(flatten)]
    pub class: TestClass,
    /// Jar or directory the class was found in.
    #[serde(default)]
    pub origin: Option<PathBuf>,
    /// Instrumented branch ids.
    #[serde(default)]
    pub branches: Vec<u32>,
    /// Instrumented lines.
    #[serde(default)]
    pub lines: Vec<u32>,
    /// Instrumented methods, simple names.
    #[serde(default)]
    pub instrumented_methods: Vec<String>,
    /// Instrumented methods without any branch, simple names.
    #[serde(default)]
    pub branchless_methods: Vec<String>,
}

/// Instrumentation manifest: classes and mutants known to the launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Classes in classpath order.
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
    /// Mutants of the code under test.
    #[serde(default)]
    pub mutants: Vec<Mutant>,
}

/// [`ClassIndex`] backed by a JSON manifest.
#[derive(Debug, Clone, Default)]
pub struct ManifestIndex {
    manifest: Manifest,
}

impl ManifestIndex {
    /// Index over an in-memory manifest.
    pub fn new(manifest: Manifest) -> Self {
        Self { manifest }
    }

    /// Read a manifest file.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&text)?))
    }

    /// Manifest entry of `name`.
    pub fn entry(&self, name: &str) -> Option<&ClassEntry> {
        self.manifest.classes.iter().find(|e| e.class.name == name)
    }

    /// Underlying manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

impl ClassIndex for ManifestIndex {
    fn find_class(&self, name: &str) -> Option<TestClass> {
        self.entry(name).map(|e| e.class.clone())
    }

    fn classes_with_prefix(&self, prefix: &str) -> Vec<TestClass> {
        self.manifest
            .classes
            .iter()
            .filter(|e| e.class.name.starts_with(prefix))
            .map(|e| e.class.clone())
            .collect()
    }

    fn classes_in_path(&self, path: &Path) -> Result<Vec<String>, IndexError> {
        let names: Vec<String> = self
            .manifest
            .classes
            .iter()
            .filter(|e| e.origin.as_deref().is_some_and(|o| o.starts_with(path)))
            .map(|e| e.class.name.clone())
            .collect();
        if names.is_empty() {
            return Err(IndexError::UnknownPath(path.to_path_buf()));
        }
        Ok(names)
    }

    fn mutants(&self) -> Vec<Mutant> {
        self.manifest.mutants.clone()
    }
}
