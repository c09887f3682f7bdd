//! Pipeline stages and the trait they share.
//!
//! Stages are pure with respect to the container: they read it, call out
//! through [`StageServices`], and return a [`StageOutcome`]. All container
//! mutation (sections, history, errors) happens in the runner, which keeps
//! the write-once rules in one place.

mod analyze;
mod compose;
mod plan;
mod retrieve;

pub use analyze::AnalyzeStage;
pub use compose::ComposeStage;
pub use plan::PlanStage;
pub use retrieve::RetrieveStage;

use crate::collab::CapabilityClient;
use crate::container::{AnalysisContainer, ErrorRecord, SectionName};
use crate::errors::VeriflowError;
use crate::scheduler::TaskScheduler;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The fixed stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Decompose the request into retrieval sub-tasks.
    Plan,
    /// Fan out the sub-tasks and capture ground truth.
    Retrieve,
    /// Produce findings grounded in the retrieved data.
    Analyze,
    /// Compose the final narrative.
    Compose,
}

impl StageKind {
    /// The stage's canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Retrieve => "retrieve",
            Self::Analyze => "analyze",
            Self::Compose => "compose",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared services handed to every stage.
#[derive(Debug, Clone)]
pub struct StageServices {
    /// The external text-producing capability.
    pub capability: Arc<dyn CapabilityClient>,
    /// The retrieval fan-out scheduler.
    pub scheduler: TaskScheduler,
}

/// What a stage attempt produced.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// The value to finalize into the stage's section.
    pub section_value: serde_json::Value,
    /// User-facing narrative text, validated by the gate when present.
    pub narrative: Option<String>,
    /// Error records to append to the container (handled failures).
    pub annotations: Vec<ErrorRecord>,
}

impl StageOutcome {
    /// Creates an outcome with a section value only.
    #[must_use]
    pub fn section(section_value: serde_json::Value) -> Self {
        Self {
            section_value,
            narrative: None,
            annotations: Vec::new(),
        }
    }

    /// Attaches narrative text for validation.
    #[must_use]
    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = Some(narrative.into());
        self
    }

    /// Attaches handled-error annotations.
    #[must_use]
    pub fn with_annotations(mut self, annotations: Vec<ErrorRecord>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is.
    fn kind(&self) -> StageKind;

    /// The section this stage owns and finalizes.
    fn section(&self) -> SectionName;

    /// Whether a failed attempt may be retried or replaced by a fallback.
    /// Non-recoverable failure aborts the pipeline.
    fn recoverable(&self) -> bool {
        true
    }

    /// The guidance used for a first attempt.
    fn base_guidance(&self, container: &AnalysisContainer) -> String;

    /// Runs one attempt.
    async fn run(
        &self,
        container: &AnalysisContainer,
        services: &StageServices,
        guidance: &str,
    ) -> Result<StageOutcome, VeriflowError>;

    /// The conservative outcome emitted when retries are exhausted.
    fn fallback_outcome(&self, container: &AnalysisContainer) -> StageOutcome;
}
