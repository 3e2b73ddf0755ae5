//! Output variables and the sinks that receive them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Named statistic reported per target class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuntimeVariable {
    /// Goals across all requested criteria.
    #[serde(rename = "Total_Goals")]
    TotalGoals,
    /// Covered goals across all requested criteria.
    #[serde(rename = "Covered_Goals")]
    CoveredGoals,
    /// Covered / total, 1.0 when there are no goals.
    Coverage,
    /// Branch coverage ratio.
    BranchCoverage,
    /// Line coverage ratio.
    LineCoverage,
    /// Method coverage ratio.
    MethodCoverage,
    /// Weak mutation score.
    WeakMutationScore,
    /// Strong mutation score.
    MutationScore,
    /// Concatenated bit-string over all criteria.
    CoverageBitString,
    /// Branch goals bit-string.
    BranchCoverageBitString,
    /// Line goals bit-string.
    LineCoverageBitString,
    /// Method goals bit-string.
    MethodCoverageBitString,
    /// Weak mutation goals bit-string.
    WeakMutationCoverageBitString,
    /// Strong mutation goals bit-string.
    MutationCoverageBitString,
    /// Executed test methods.
    #[serde(rename = "Tests_Executed")]
    TestsExecuted,
    /// Tests covering at least one goal.
    #[serde(rename = "Minimized_Size")]
    MinimizedSize,
    /// Analysis wall time in milliseconds.
    #[serde(rename = "Total_Time")]
    TotalTime,
    /// Distinct exception types thrown explicitly by the code under test.
    #[serde(rename = "Explicit_TypeExceptions")]
    ExplicitTypeExceptions,
}

impl RuntimeVariable {
    /// Column name used in statistics output.
    pub fn name(self) -> &'static str {
        match self {
            Self::TotalGoals => "Total_Goals",
            Self::CoveredGoals => "Covered_Goals",
            Self::Coverage => "Coverage",
            Self::BranchCoverage => "BranchCoverage",
            Self::LineCoverage => "LineCoverage",
            Self::MethodCoverage => "MethodCoverage",
            Self::WeakMutationScore => "WeakMutationScore",
            Self::MutationScore => "MutationScore",
            Self::CoverageBitString => "CoverageBitString",
            Self::BranchCoverageBitString => "BranchCoverageBitString",
            Self::LineCoverageBitString => "LineCoverageBitString",
            Self::MethodCoverageBitString => "MethodCoverageBitString",
            Self::WeakMutationCoverageBitString => "WeakMutationCoverageBitString",
            Self::MutationCoverageBitString => "MutationCoverageBitString",
            Self::TestsExecuted => "Tests_Executed",
            Self::MinimizedSize => "Minimized_Size",
            Self::TotalTime => "Total_Time",
            Self::ExplicitTypeExceptions => "Explicit_TypeExceptions",
        }
    }
}

impl fmt::Display for RuntimeVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    /// Count.
    Int(i64),
    /// Ratio or measurement.
    Float(f64),
    /// Bit-strings and labels.
    Text(String),
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<usize> for StatValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u64> for StatValue {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for StatValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for StatValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for StatValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Receives statistics for the current target class.
pub trait StatisticsSink {
    /// Record `value` for `variable`, replacing any earlier value.
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: StatValue);

    /// The next values belong to another target class.
    fn flush_class_change(&mut self);
}

impl<S: StatisticsSink + ?Sized> StatisticsSink for &mut S {
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: StatValue) {
        (**self).track_output_variable(variable, value);
    }

    fn flush_class_change(&mut self) {
        (**self).flush_class_change();
    }
}

impl<S: StatisticsSink + ?Sized> StatisticsSink for Box<S> {
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: StatValue) {
        (**self).track_output_variable(variable, value);
    }

    fn flush_class_change(&mut self) {
        (**self).flush_class_change();
    }
}

/// Keeps every flushed class in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    current: BTreeMap<RuntimeVariable, StatValue>,
    flushed: Vec<BTreeMap<RuntimeVariable, StatValue>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of the class currently being reported.
    pub fn current(&self) -> &BTreeMap<RuntimeVariable, StatValue> {
        &self.current
    }

    /// One value of the current class.
    pub fn get(&self, variable: RuntimeVariable) -> Option<&StatValue> {
        self.current.get(&variable)
    }

    /// Classes already flushed, oldest first.
    pub fn flushed(&self) -> &[BTreeMap<RuntimeVariable, StatValue>] {
        &self.flushed
    }
}

impl StatisticsSink for MemorySink {
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: StatValue) {
        self.current.insert(variable, value);
    }

    fn flush_class_change(&mut self) {
        self.flushed.push(std::mem::take(&mut self.current));
    }
}

#[derive(Serialize)]
struct StatisticsLine<'a> {
    variables: BTreeMap<&'static str, &'a StatValue>,
}

/// Appends one JSON object per class to a file.
#[derive(Debug, Clone)]
pub struct JsonlStatisticsSink {
    path: PathBuf,
    current: BTreeMap<RuntimeVariable, StatValue>,
}

impl JsonlStatisticsSink {
    /// Sink appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: BTreeMap::new(),
        }
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the buffered class, if any, and clear the buffer.
    pub fn write_pending(&mut self) -> Result<(), SinkError> {
        if self.current.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let line = StatisticsLine {
            variables: self.current.iter().map(|(k, v)| (k.name(), v)).collect(),
        };
        let json = serde_json::to_string(&line)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.current.clear();
        Ok(())
    }
}

impl StatisticsSink for JsonlStatisticsSink {
    fn track_output_variable(&mut self, variable: RuntimeVariable, value: StatValue) {
        self.current.insert(variable, value);
    }

    fn flush_class_change(&mut self) {
        if let Err(err) = self.write_pending() {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                "failed to write statistics"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn memory_sink_separates_classes() {
        let mut sink = MemorySink::new();
        sink.track_output_variable(RuntimeVariable::TotalGoals, 3usize.into());
        sink.flush_class_change();
        sink.track_output_variable(RuntimeVariable::Coverage, 1.0.into());
        assert_eq!(sink.flushed().len(), 1);
        assert_eq!(
            sink.flushed()[0].get(&RuntimeVariable::TotalGoals),
            Some(&StatValue::Int(3))
        );
        assert_eq!(sink.get(RuntimeVariable::Coverage), Some(&StatValue::Float(1.0)));
        assert!(sink.get(RuntimeVariable::TotalGoals).is_none());
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_flush() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("stats").join("statistics.jsonl");
        let mut sink = JsonlStatisticsSink::new(&path);

        sink.track_output_variable(RuntimeVariable::CoverageBitString, "101".into());
        sink.track_output_variable(RuntimeVariable::TestsExecuted, 2usize.into());
        sink.flush_class_change();
        sink.flush_class_change();
        sink.track_output_variable(RuntimeVariable::Coverage, 0.5.into());
        sink.write_pending().expect("pending statistics should be written");

        let text = std::fs::read_to_string(&path).expect("statistics should exist");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("line should parse");
        assert_eq!(first["variables"]["CoverageBitString"], "101");
        assert_eq!(first["variables"]["Tests_Executed"], 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("line should parse");
        assert_eq!(second["variables"]["Coverage"], 0.5);
    }
}
