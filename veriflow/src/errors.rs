//! Error types for the veriflow pipeline core.
//!
//! The taxonomy separates recoverable conditions (absorbed locally by the
//! retry/fallback controller and logged into the container's error list)
//! from fatal conditions (abort the pipeline but still return the best
//! partial container) and programming errors (fail loudly).

use thiserror::Error;

/// The main error type for veriflow operations.
#[derive(Debug, Error)]
pub enum VeriflowError {
    /// A validation gate found discrepancies in a stage output.
    ///
    /// Recoverable: triggers retry with amended guidance, then fallback.
    #[error("validation tripwire in stage '{stage}': {summary}")]
    ValidationTripwire {
        /// The stage whose output tripped the gate.
        stage: String,
        /// A short itemization of the discrepancies found.
        summary: String,
    },

    /// A single sub-task failed within a fan-out batch.
    ///
    /// Recoverable as long as at least one sibling task succeeds.
    #[error("sub-task '{task_id}' failed: {reason}")]
    SubTaskFailure {
        /// The failed task's identifier.
        task_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Every sub-task in a fan-out batch failed.
    ///
    /// Fatal for the owning stage; aborts the pipeline when the stage is
    /// non-recoverable (no ground truth was obtained).
    #[error("all {count} sub-tasks failed in stage '{stage}'")]
    AllSubTasksFailed {
        /// The stage that fanned out.
        stage: String,
        /// Number of tasks attempted.
        count: usize,
    },

    /// A stage exceeded its time budget.
    #[error("stage '{stage}' timed out after {timeout_ms} ms")]
    StageTimeout {
        /// The stage that timed out.
        stage: String,
        /// The budget that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// A stage attempted to overwrite a section finalized by another stage.
    ///
    /// Programming error: never expected in correct operation, never
    /// swallowed.
    #[error("section '{section}' already finalized by stage '{written_by}' (attempted by '{attempted_by}')")]
    SectionAlreadyFinalized {
        /// The section name.
        section: String,
        /// The stage that finalized it.
        written_by: String,
        /// The stage that attempted the rewrite.
        attempted_by: String,
    },

    /// The delegated capability collaborator failed to produce a response.
    #[error("capability call failed: {0}")]
    Capability(String),

    /// A query executor error.
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VeriflowError {
    /// Returns true if the error is recoverable by retry or fallback.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationTripwire { .. }
                | Self::SubTaskFailure { .. }
                | Self::Capability(_)
        )
    }

    /// Returns a short kind label for error records and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationTripwire { .. } => "validation_tripwire",
            Self::SubTaskFailure { .. } => "sub_task_failure",
            Self::AllSubTasksFailed { .. } => "all_sub_tasks_failed",
            Self::StageTimeout { .. } => "stage_timeout",
            Self::SectionAlreadyFinalized { .. } => "section_already_finalized",
            Self::Capability(_) => "capability",
            Self::Query(_) => "query",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Errors from the read-only structured-data query executor.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The executor rejected or failed the query.
    #[error("query execution failed: {0}")]
    Execution(String),

    /// The executor rejected a mutating request.
    ///
    /// The core never issues mutating requests; hitting this is a
    /// programming error, not a recoverable condition.
    #[error("mutating query rejected by read-only executor")]
    MutationRejected,

    /// The query did not complete within the per-task timeout.
    #[error("query timed out after {timeout_ms} ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}
