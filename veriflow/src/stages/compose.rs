//! The composition stage: the final user-facing narrative.

use super::{Stage, StageKind, StageOutcome, StageServices};
use crate::collab::CapabilityRequest;
use crate::container::{AnalysisContainer, SectionName};
use crate::errors::VeriflowError;
use async_trait::async_trait;
use serde_json::json;

/// Composes the final answer from the findings and retrieved data. The
/// composed text goes through the validation gate; its fallback makes no
/// factual claims at all.
#[derive(Debug, Default)]
pub struct ComposeStage;

#[async_trait]
impl Stage for ComposeStage {
    fn kind(&self) -> StageKind {
        StageKind::Compose
    }

    fn section(&self) -> SectionName {
        SectionName::Narrative
    }

    fn base_guidance(&self, _container: &AnalysisContainer) -> String {
        "Compose a direct answer to the request using only the findings \
         and retrieved values. Do not introduce entities or figures that \
         are not present in them."
            .to_string()
    }

    async fn run(
        &self,
        container: &AnalysisContainer,
        services: &StageServices,
        guidance: &str,
    ) -> Result<StageOutcome, VeriflowError> {
        let findings = container
            .section(SectionName::Findings)
            .and_then(|v| v.get("text"))
            .cloned();
        let request = CapabilityRequest::new(
            guidance,
            json!({
                "request": container.input.raw_request,
                "findings": findings,
                "records": serde_json::to_value(container.ground_truth().records())?,
            }),
        );
        let response = services
            .capability
            .complete(request)
            .await
            .map_err(|e| VeriflowError::Capability(e.to_string()))?;

        Ok(StageOutcome::section(json!({ "text": response.text }))
            .with_narrative(response.text))
    }

    fn fallback_outcome(&self, _container: &AnalysisContainer) -> StageOutcome {
        let text = "A fully verified answer could not be produced for this \
                    request. The retrieved data was recorded and is available \
                    for direct inspection.";
        StageOutcome::section(json!({ "text": text, "fallback": true }))
    }
}
