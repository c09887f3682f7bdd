//! The accumulating, immutable-handoff analysis container.

use super::{ErrorRecord, ProcessingRecord, RequestIdentity, StageRunStatus};
use crate::errors::VeriflowError;
use crate::gate::Verdict;
use crate::groundtruth::{GroundTruth, RetrievedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The per-stage sections of the container, in pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    /// The plan produced by the planning stage.
    Plan,
    /// Retrieved-data records from the fan-out stage.
    RetrievedData,
    /// Findings from the analysis stage.
    Findings,
    /// The narrative draft.
    Narrative,
    /// The final composed output.
    FinalOutput,
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::RetrievedData => write!(f, "retrieved_data"),
            Self::Findings => write!(f, "findings"),
            Self::Narrative => write!(f, "narrative"),
            Self::FinalOutput => write!(f, "final_output"),
        }
    }
}

/// A finalized section value together with the stage that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    /// The stage that finalized this section.
    pub written_by: String,
    /// The section value.
    pub value: serde_json::Value,
}

/// The original request plus prior-turn seed context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInput {
    /// The user's raw request text.
    pub raw_request: String,
    /// Prior requests in the same session, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_requests: Vec<String>,
    /// Ground truth carried forward from prior turns, read-only.
    #[serde(default, skip_serializing_if = "GroundTruth::is_empty")]
    pub seed_ground_truth: GroundTruth,
}

/// The accumulating analysis state threaded through the pipeline.
///
/// Containers are handed off by value: each stage receives a container and
/// returns a new one, which keeps concurrent fan-out free of shared-mutable
/// state. A section, once written by its owning stage, is read-only to all
/// later stages; later stages may only append new sections or annotate the
/// error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContainer {
    /// Request/session identity.
    pub identity: RequestIdentity,
    /// The stage currently processing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    /// Original request and seed context.
    pub input: RequestInput,
    /// Ordered processing history.
    #[serde(default)]
    history: Vec<ProcessingRecord>,
    /// Finalized per-stage sections.
    #[serde(default)]
    sections: BTreeMap<SectionName, SectionEntry>,
    /// Ordered structured error records.
    #[serde(default)]
    errors: Vec<ErrorRecord>,
    /// True if the pipeline aborted before the final stage.
    #[serde(default)]
    pub aborted: bool,
}

impl AnalysisContainer {
    /// Creates a container for a new request.
    #[must_use]
    pub fn new(raw_request: impl Into<String>) -> Self {
        Self {
            identity: RequestIdentity::new(),
            current_stage: None,
            input: RequestInput {
                raw_request: raw_request.into(),
                prior_requests: Vec::new(),
                seed_ground_truth: GroundTruth::new(),
            },
            history: Vec::new(),
            sections: BTreeMap::new(),
            errors: Vec::new(),
            aborted: false,
        }
    }

    /// Creates a container for a follow-on request in the same session,
    /// carrying forward the prior turn's ground truth and request text as
    /// read-only seed context.
    #[must_use]
    pub fn seed_followup(&self, raw_request: impl Into<String>) -> Self {
        let mut prior_requests = self.input.prior_requests.clone();
        prior_requests.push(self.input.raw_request.clone());

        Self {
            identity: RequestIdentity::in_session(self.identity.session_id),
            current_stage: None,
            input: RequestInput {
                raw_request: raw_request.into(),
                prior_requests,
                seed_ground_truth: self.ground_truth(),
            },
            history: Vec::new(),
            sections: BTreeMap::new(),
            errors: Vec::new(),
            aborted: false,
        }
    }

    /// Finalizes a section.
    ///
    /// Returns a new container. Fails with
    /// [`VeriflowError::SectionAlreadyFinalized`] if the section was
    /// previously written by a different stage; the owning stage may
    /// rewrite its own section (retry before handoff).
    pub fn with_section(
        mut self,
        name: SectionName,
        stage: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Self, VeriflowError> {
        let stage = stage.into();
        if let Some(existing) = self.sections.get(&name) {
            if existing.written_by != stage {
                return Err(VeriflowError::SectionAlreadyFinalized {
                    section: name.to_string(),
                    written_by: existing.written_by.clone(),
                    attempted_by: stage,
                });
            }
        }
        self.sections.insert(
            name,
            SectionEntry {
                written_by: stage,
                value,
            },
        );
        Ok(self)
    }

    /// Returns a finalized section value, if present.
    #[must_use]
    pub fn section(&self, name: SectionName) -> Option<&serde_json::Value> {
        self.sections.get(&name).map(|e| &e.value)
    }

    /// Returns the stage that finalized a section, if present.
    #[must_use]
    pub fn section_written_by(&self, name: SectionName) -> Option<&str> {
        self.sections.get(&name).map(|e| e.written_by.as_str())
    }

    /// Records the start of a stage run.
    #[must_use]
    pub fn begin_stage(mut self, stage: impl Into<String>) -> Self {
        let stage = stage.into();
        self.current_stage = Some(stage.clone());
        self.history.push(ProcessingRecord::started(stage));
        self
    }

    /// Records the end of the current stage run.
    #[must_use]
    pub fn finish_stage(mut self, status: StageRunStatus, duration_ms: f64) -> Self {
        if let Some(record) = self.history.last_mut() {
            record.finish(status, duration_ms);
        }
        self
    }

    /// Appends a validation verdict to the current stage's history entry.
    #[must_use]
    pub fn record_verdict(mut self, verdict: Verdict) -> Self {
        if let Some(record) = self.history.last_mut() {
            record.verdicts.push(verdict);
        }
        self
    }

    /// Appends a structured error record. Always permitted.
    #[must_use]
    pub fn annotate_error(mut self, record: ErrorRecord) -> Self {
        self.errors.push(record);
        self
    }

    /// Marks the container as aborted.
    #[must_use]
    pub fn mark_aborted(mut self) -> Self {
        self.aborted = true;
        self
    }

    /// Returns the ordered processing history.
    #[must_use]
    pub fn history(&self) -> &[ProcessingRecord] {
        &self.history
    }

    /// Returns the ordered error records.
    #[must_use]
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Returns true if any errors were recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the accumulated ground truth: seed records carried forward
    /// plus everything retrieved so far. Grows monotonically.
    #[must_use]
    pub fn ground_truth(&self) -> GroundTruth {
        let mut gt = self.input.seed_ground_truth.clone();
        if let Some(value) = self.section(SectionName::RetrievedData) {
            if let Some(records) = value.get("records") {
                if let Ok(records) =
                    serde_json::from_value::<Vec<RetrievedRecord>>(records.clone())
                {
                    for record in records {
                        gt.push(record);
                    }
                }
            }
        }
        gt
    }

    /// Returns the final output text, if composed.
    #[must_use]
    pub fn final_output(&self) -> Option<&str> {
        self.section(SectionName::FinalOutput)
            .and_then(|v| v.get("text"))
            .and_then(serde_json::Value::as_str)
    }

    /// Serializes the container to its plain nested-map form, suitable for
    /// storage, replay, or cross-process inspection.
    pub fn to_plain(&self) -> Result<serde_json::Value, VeriflowError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Reconstructs a container from its plain form.
    ///
    /// Satisfies `from_plain(to_plain(c)) == c` structurally for all
    /// reachable containers.
    pub fn from_plain(value: serde_json::Value) -> Result<Self, VeriflowError> {
        Ok(serde_json::from_value(value)?)
    }
}
