//! The planning stage: decomposes the request into retrieval sub-tasks.

use super::{Stage, StageKind, StageOutcome, StageServices};
use crate::collab::CapabilityRequest;
use crate::container::{AnalysisContainer, SectionName};
use crate::errors::VeriflowError;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Asks the capability for a plan and a set of retrieval sub-tasks.
///
/// Plan output is structural, not user-facing narrative, so it is not
/// run through the validation gate.
#[derive(Debug, Default)]
pub struct PlanStage;

#[async_trait]
impl Stage for PlanStage {
    fn kind(&self) -> StageKind {
        StageKind::Plan
    }

    fn section(&self) -> SectionName {
        SectionName::Plan
    }

    fn base_guidance(&self, _container: &AnalysisContainer) -> String {
        "Decompose the request into the smallest set of read-only queries \
         that fully answers it. For each query state its purpose."
            .to_string()
    }

    async fn run(
        &self,
        container: &AnalysisContainer,
        services: &StageServices,
        guidance: &str,
    ) -> Result<StageOutcome, VeriflowError> {
        let request = CapabilityRequest::new(
            guidance,
            json!({
                "request": container.input.raw_request,
                "prior_requests": container.input.prior_requests,
            }),
        );
        let response = services
            .capability
            .complete(request)
            .await
            .map_err(|e| VeriflowError::Capability(e.to_string()))?;

        info!(
            sub_tasks = response.sub_requests.len(),
            "plan produced"
        );
        Ok(StageOutcome::section(json!({
            "plan": response.text,
            "sub_tasks": response.sub_requests,
        })))
    }

    fn fallback_outcome(&self, _container: &AnalysisContainer) -> StageOutcome {
        // No plan could be obtained; an empty task list makes retrieval
        // fail fast rather than guessing at queries.
        StageOutcome::section(json!({
            "plan": "planning unavailable",
            "sub_tasks": [],
        }))
    }
}
