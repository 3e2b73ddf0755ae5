//! Mutants and the pool they are loaded into.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier assigned to a mutant by the instrumentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutantId(pub u32);

impl fmt::Display for MutantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One syntactic variant of the code under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutant {
    /// Identifier.
    pub id: MutantId,
    /// Mutated class.
    pub class_name: String,
    /// Mutated method.
    #[serde(default)]
    pub method_name: String,
    /// Source line of the mutation point.
    #[serde(default)]
    pub line: u32,
    /// Mutation operator name, e.g. `ReplaceComparisonOperator`.
    pub operator: String,
}

impl fmt::Display for Mutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mutation {}: {}.{}:{} {}",
            self.id, self.class_name, self.method_name, self.line, self.operator
        )
    }
}

/// Mutants known for one class loader, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutantPool {
    mutants: BTreeMap<MutantId, Mutant>,
}

impl MutantPool {
    /// Build a pool, later duplicates replace earlier ones.
    pub fn new(mutants: impl IntoIterator<Item = Mutant>) -> Self {
        Self {
            mutants: mutants.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    /// Number of mutants.
    pub fn len(&self) -> usize {
        self.mutants.len()
    }

    /// True if the pool holds no mutants.
    pub fn is_empty(&self) -> bool {
        self.mutants.is_empty()
    }

    /// Look up one mutant.
    pub fn get(&self, id: MutantId) -> Option<&Mutant> {
        self.mutants.get(&id)
    }

    /// All mutants in id order.
    pub fn mutants(&self) -> impl Iterator<Item = &Mutant> {
        self.mutants.values()
    }

    /// Mutants located in `class_name`.
    pub fn for_class<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a Mutant> + 'a {
        self.mutants
            .values()
            .filter(move |m| m.class_name == class_name)
    }

    /// All mutant ids in id order.
    pub fn ids(&self) -> Vec<MutantId> {
        self.mutants.keys().copied().collect()
    }
}
