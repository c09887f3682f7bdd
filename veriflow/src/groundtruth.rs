//! Retrieved-data records and the accumulated ground-truth reference.
//!
//! Result sets are stored verbatim as ground truth for validation gates;
//! they are never rewritten, only referenced. The [`GroundTruth`] union
//! grows monotonically as the pipeline progresses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The declared type of a result-set column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit integer values.
    Integer,
    /// 64-bit float values.
    Float,
    /// UTF-8 text values.
    Text,
    /// Boolean values.
    Bool,
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnValue {
    /// Absent value.
    Null,
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Boolean value.
    Bool(bool),
}

impl ColumnValue {
    /// Returns the value as a float if it is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as text if it is textual.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A named, typed column of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as returned by the executor.
    pub name: String,
    /// Declared column type.
    pub column_type: ColumnType,
}

impl Column {
    /// Creates a new column descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// An ordered set of rows with typed columns, stored verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column descriptors, in result order.
    pub columns: Vec<Column>,
    /// Rows, each aligned with `columns`.
    pub rows: Vec<Vec<ColumnValue>>,
}

impl ResultSet {
    /// Creates an empty result set with the given columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<ColumnValue>) -> Self {
        self.rows.push(row);
        self
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of a column by name, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Completion status of a retrieval sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskStatus {
    /// The sub-task completed and its result set was captured.
    Succeeded,
    /// The sub-task failed or timed out.
    Failed {
        /// What went wrong.
        error: String,
    },
}

impl TaskStatus {
    /// Returns true for [`TaskStatus::Succeeded`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Record of one retrieval sub-task: identity, the exact query issued,
/// timing, and the verbatim result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRecord {
    /// Task identifier.
    pub task_id: String,
    /// Human-readable purpose of the task.
    pub purpose: String,
    /// The exact query/request issued.
    pub query: String,
    /// Execution duration in milliseconds.
    pub duration_ms: f64,
    /// The result set (empty on failure).
    pub result: ResultSet,
    /// Terminal status.
    pub status: TaskStatus,
}

impl RetrievedRecord {
    /// Creates a succeeded record.
    #[must_use]
    pub fn succeeded(
        task_id: impl Into<String>,
        purpose: impl Into<String>,
        query: impl Into<String>,
        duration_ms: f64,
        result: ResultSet,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            purpose: purpose.into(),
            query: query.into(),
            duration_ms,
            result,
            status: TaskStatus::Succeeded,
        }
    }

    /// Creates a failed record with the captured error.
    #[must_use]
    pub fn failed(
        task_id: impl Into<String>,
        purpose: impl Into<String>,
        query: impl Into<String>,
        duration_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            purpose: purpose.into(),
            query: query.into(),
            duration_ms,
            result: ResultSet::default(),
            status: TaskStatus::Failed {
                error: error.into(),
            },
        }
    }
}

/// Normalizes a label or column name for matching: lowercased with
/// whitespace and underscores folded out.
#[must_use]
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The accumulated union of retrieved-data records: the only source of
/// truth that claims are checked against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    records: Vec<RetrievedRecord>,
}

impl GroundTruth {
    /// Creates an empty ground-truth reference.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Records are never rewritten.
    pub fn push(&mut self, record: RetrievedRecord) {
        self.records.push(record);
    }

    /// Returns all records in accumulation order.
    #[must_use]
    pub fn records(&self) -> &[RetrievedRecord] {
        &self.records
    }

    /// Returns true if no records have been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns all numeric values stored under a label, in accumulation
    /// and row order. Labels match normalized column names.
    #[must_use]
    pub fn values_for_label(&self, label: &str) -> Vec<f64> {
        let wanted = normalize_label(label);
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut values = Vec::new();
        for record in self.records.iter().filter(|r| r.status.is_success()) {
            for (idx, column) in record.result.columns.iter().enumerate() {
                if normalize_label(&column.name) != wanted {
                    continue;
                }
                for row in &record.result.rows {
                    if let Some(v) = row.get(idx).and_then(ColumnValue::as_f64) {
                        values.push(v);
                    }
                }
            }
        }
        values
    }

    /// Returns the time-ordered series stored under a label.
    ///
    /// Row order within and across records is taken as time order, which
    /// holds because retrieval results are merged in submission order.
    #[must_use]
    pub fn series_for_label(&self, label: &str) -> Vec<f64> {
        self.values_for_label(label)
    }

    /// Returns the known-entity vocabulary: every text value appearing in
    /// a successful result set. This set is exhaustive for the current
    /// analysis scope.
    #[must_use]
    pub fn known_entities(&self) -> BTreeSet<String> {
        let mut entities = BTreeSet::new();
        for record in self.records.iter().filter(|r| r.status.is_success()) {
            for row in &record.result.rows {
                for cell in row {
                    if let Some(text) = cell.as_text() {
                        if !text.is_empty() {
                            entities.insert(text.to_string());
                        }
                    }
                }
            }
        }
        entities
    }
}
