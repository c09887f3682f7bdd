//! Processing-history and error records.

use crate::gate::Verdict;
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of one stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    /// The stage is currently running.
    InProgress,
    /// The stage's output passed the gate.
    Succeeded,
    /// Retries exhausted; a conservative fallback output was substituted.
    FallbackEmitted,
    /// The stage failed.
    Failed,
    /// The stage caused the pipeline to abort.
    Aborted,
}

impl fmt::Display for StageRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::FallbackEmitted => write!(f, "fallback_emitted"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// One processing-history entry: a stage run with timing, terminal status,
/// and the validation verdicts produced per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// Stage name.
    pub stage: String,
    /// ISO 8601 start timestamp.
    pub start_time: String,
    /// ISO 8601 end timestamp, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Wall-clock duration in milliseconds, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Current or terminal status.
    pub status: StageRunStatus,
    /// One verdict per validation attempt, in attempt order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<Verdict>,
}

impl ProcessingRecord {
    /// Creates a record for a stage that just started.
    #[must_use]
    pub fn started(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            start_time: iso_timestamp(),
            end_time: None,
            duration_ms: None,
            status: StageRunStatus::InProgress,
            verdicts: Vec::new(),
        }
    }

    /// Marks the record finished with the given status and duration.
    pub fn finish(&mut self, status: StageRunStatus, duration_ms: f64) {
        self.end_time = Some(iso_timestamp());
        self.duration_ms = Some(duration_ms);
        self.status = status;
    }
}

/// A structured error record in the container's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The stage where the error occurred.
    pub stage: String,
    /// Error kind label (see `VeriflowError::kind`).
    pub kind: String,
    /// Description of what happened.
    pub description: String,
    /// Whether the error was absorbed locally.
    pub handled: bool,
    /// Recovery action taken, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_action: Option<String>,
}

impl ErrorRecord {
    /// Creates a new handled error record.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            kind: kind.into(),
            description: description.into(),
            handled: true,
            recovery_action: None,
        }
    }

    /// Marks the error as unhandled.
    #[must_use]
    pub fn unhandled(mut self) -> Self {
        self.handled = false;
        self
    }

    /// Records the recovery action taken.
    #[must_use]
    pub fn with_recovery(mut self, action: impl Into<String>) -> Self {
        self.recovery_action = Some(action.into());
        self
    }
}
