//! Coverage criteria.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::stats::RuntimeVariable;

/// Strategy defining what "covered" means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criterion {
    /// Both edges of every branch, plus entry of every branchless method.
    Branch,
    /// Both edges of every branch.
    OnlyBranch,
    /// Every instrumented line.
    Line,
    /// Entry of every instrumented method.
    Method,
    /// A mutant counts once a test executes its location.
    WeakMutation,
    /// A mutant counts once a test executes it and its outcome changes.
    StrongMutation,
    /// Same decision as [`Criterion::StrongMutation`].
    Mutation,
    /// Same decision as [`Criterion::StrongMutation`], reported alone.
    OnlyMutation,
}

impl Criterion {
    /// All criteria in canonical order.
    pub const ALL: [Criterion; 8] = [
        Self::Branch,
        Self::OnlyBranch,
        Self::Line,
        Self::Method,
        Self::WeakMutation,
        Self::StrongMutation,
        Self::Mutation,
        Self::OnlyMutation,
    ];

    /// Goals come from the mutant pool instead of a goal factory.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::WeakMutation | Self::StrongMutation | Self::Mutation | Self::OnlyMutation
        )
    }

    /// Coverage requires a second run with the mutant active.
    pub fn requires_kill(self) -> bool {
        self.is_mutation() && self != Self::WeakMutation
    }

    /// Statistic holding this criterion's coverage ratio.
    pub fn coverage_variable(self) -> RuntimeVariable {
        match self {
            Self::Branch | Self::OnlyBranch => RuntimeVariable::BranchCoverage,
            Self::Line => RuntimeVariable::LineCoverage,
            Self::Method => RuntimeVariable::MethodCoverage,
            Self::WeakMutation => RuntimeVariable::WeakMutationScore,
            Self::StrongMutation | Self::Mutation | Self::OnlyMutation => {
                RuntimeVariable::MutationScore
            }
        }
    }

    /// Statistic holding this criterion's bit-string.
    pub fn bit_string_variable(self) -> RuntimeVariable {
        match self {
            Self::Branch | Self::OnlyBranch => RuntimeVariable::BranchCoverageBitString,
            Self::Line => RuntimeVariable::LineCoverageBitString,
            Self::Method => RuntimeVariable::MethodCoverageBitString,
            Self::WeakMutation => RuntimeVariable::WeakMutationCoverageBitString,
            Self::StrongMutation | Self::Mutation | Self::OnlyMutation => {
                RuntimeVariable::MutationCoverageBitString
            }
        }
    }

    /// Configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::OnlyBranch => "only-branch",
            Self::Line => "line",
            Self::Method => "method",
            Self::WeakMutation => "weak-mutation",
            Self::StrongMutation => "strong-mutation",
            Self::Mutation => "mutation",
            Self::OnlyMutation => "only-mutation",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let compact = normalized.replace('-', "");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized || c.as_str().replace('-', "") == compact)
            .ok_or_else(|| format!("unknown criterion: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_criteria_are_flagged() {
        assert!(!Criterion::Branch.is_mutation());
        assert!(Criterion::WeakMutation.is_mutation());
        assert!(!Criterion::WeakMutation.requires_kill());
        assert!(Criterion::Mutation.requires_kill());
        assert!(Criterion::OnlyMutation.requires_kill());
        assert_eq!(
            Criterion::StrongMutation.coverage_variable(),
            RuntimeVariable::MutationScore
        );
    }

    #[test]
    fn criteria_parse_in_several_spellings() {
        assert_eq!("BRANCH".parse::<Criterion>(), Ok(Criterion::Branch));
        assert_eq!("onlybranch".parse::<Criterion>(), Ok(Criterion::OnlyBranch));
        assert_eq!("strong_mutation".parse::<Criterion>(), Ok(Criterion::StrongMutation));
        assert_eq!("weak-mutation".parse::<Criterion>(), Ok(Criterion::WeakMutation));
        assert!("statement".parse::<Criterion>().is_err());
    }
}
