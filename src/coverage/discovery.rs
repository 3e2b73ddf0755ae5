//! Target resolution, test discovery and ordering.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classes::{ClassIndex, IndexError, TestClass, is_test_class};

/// Order in which discovered test classes are executed.
///
/// The order decides which static state leaks between test classes, so it
/// is always deterministic for the same input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOrdering {
    /// Longest name first, ties kept in discovery order.
    #[default]
    NameLengthDescending,
    /// By name.
    Lexicographic,
    /// As discovered.
    Discovery,
}

/// Expand a target specifier into class names.
///
/// An existing jar or directory is expanded through dependency analysis;
/// anything else names a single class.
pub fn resolve_targets(
    index: &dyn ClassIndex,
    specifier: &str,
) -> Result<Vec<String>, IndexError> {
    let path = Path::new(specifier);
    if path.exists() {
        let classes = index.classes_in_path(path)?;
        info!(path = specifier, classes = classes.len(), "resolved target classes");
        Ok(classes)
    } else {
        Ok(vec![specifier.to_string()])
    }
}

/// Find the test classes named by a `:`-separated prefix list.
///
/// Each entry is tried as a jar or directory, then as an exact class name,
/// then as a package prefix. Targets are never returned and duplicates keep
/// their first position.
pub fn discover_tests(
    index: &dyn ClassIndex,
    prefixes: &str,
    targets: &[String],
) -> Vec<TestClass> {
    let mut found: Vec<TestClass> = Vec::new();
    for entry in prefixes.split(':').map(str::trim).filter(|e| !e.is_empty()) {
        let candidates = discover_entry(index, entry);
        debug!(entry, candidates = candidates.len(), "discovered test candidates");
        for class in candidates {
            if targets.iter().any(|t| *t == class.name) {
                continue;
            }
            if found.iter().any(|c| c.name == class.name) {
                continue;
            }
            found.push(class);
        }
    }
    found
}

fn discover_entry(index: &dyn ClassIndex, entry: &str) -> Vec<TestClass> {
    let path = Path::new(entry);
    if path.exists() {
        return match index.classes_in_path(path) {
            Ok(names) => names
                .iter()
                .filter_map(|name| index.find_class(name))
                .filter(is_test_class)
                .collect(),
            Err(err) => {
                debug!(entry, error = %err, "no classes under test path");
                Vec::new()
            }
        };
    }
    match index.find_class(entry) {
        Some(class) if is_test_class(&class) => vec![class],
        Some(class) => {
            debug!(class = %class.name, "exact match is not a test class");
            Vec::new()
        }
        None => index
            .classes_with_prefix(entry)
            .into_iter()
            .filter(is_test_class)
            .collect(),
    }
}

/// Sort `classes` in place. Stable.
pub fn order_tests(classes: &mut [TestClass], ordering: TestOrdering) {
    match ordering {
        TestOrdering::NameLengthDescending => {
            classes.sort_by(|a, b| b.name.len().cmp(&a.name.len()));
        }
        TestOrdering::Lexicographic => classes.sort_by(|a, b| a.name.cmp(&b.name)),
        TestOrdering::Discovery => {}
    }
}
