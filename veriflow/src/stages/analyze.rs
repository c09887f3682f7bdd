//! The analysis stage: findings grounded in retrieved data.

use super::{Stage, StageKind, StageOutcome, StageServices};
use crate::collab::CapabilityRequest;
use crate::container::{AnalysisContainer, SectionName};
use crate::errors::VeriflowError;
use async_trait::async_trait;
use serde_json::json;

/// Produces findings over the accumulated ground truth. The findings text
/// is narrative and goes through the validation gate.
#[derive(Debug, Default)]
pub struct AnalyzeStage;

#[async_trait]
impl Stage for AnalyzeStage {
    fn kind(&self) -> StageKind {
        StageKind::Analyze
    }

    fn section(&self) -> SectionName {
        SectionName::Findings
    }

    fn base_guidance(&self, _container: &AnalysisContainer) -> String {
        "State only findings directly supported by the retrieved result \
         sets. Quote exact values and name only entities that appear in \
         the data."
            .to_string()
    }

    async fn run(
        &self,
        container: &AnalysisContainer,
        services: &StageServices,
        guidance: &str,
    ) -> Result<StageOutcome, VeriflowError> {
        let ground_truth = container.ground_truth();
        let request = CapabilityRequest::new(
            guidance,
            json!({
                "request": container.input.raw_request,
                "plan": container.section(SectionName::Plan),
                "records": serde_json::to_value(ground_truth.records())?,
            }),
        );
        let response = services
            .capability
            .complete(request)
            .await
            .map_err(|e| VeriflowError::Capability(e.to_string()))?;

        let mut section = json!({ "text": response.text });
        if let Some(structured) = &response.structured {
            section["structured"] = structured.clone();
        }
        Ok(StageOutcome::section(section).with_narrative(response.text))
    }

    fn fallback_outcome(&self, container: &AnalysisContainer) -> StageOutcome {
        let retrieved = container.ground_truth().len();
        let text = format!(
            "Verified findings could not be produced for this request. \
             {retrieved} retrieved result sets are recorded for direct \
             inspection."
        );
        StageOutcome::section(json!({ "text": text, "fallback": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CapabilityResponse;
    use crate::groundtruth::{Column, ColumnType, ColumnValue, ResultSet, RetrievedRecord};
    use crate::scheduler::{SchedulerConfig, TaskScheduler};
    use crate::testing::{MockCapability, MockExecutor};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn services(capability: MockCapability) -> StageServices {
        StageServices {
            capability: Arc::new(capability),
            scheduler: TaskScheduler::new(Arc::new(MockExecutor::new()), SchedulerConfig::default()),
        }
    }

    fn container_with_data() -> AnalysisContainer {
        let record = RetrievedRecord::succeeded(
            "t1",
            "damage totals",
            "SELECT ...",
            5.0,
            ResultSet::new(vec![
                Column::new("Player", ColumnType::Text),
                Column::new("TotalDamage", ColumnType::Integer),
            ])
            .with_row(vec![
                ColumnValue::Text("Ana".to_string()),
                ColumnValue::Integer(114_622),
            ]),
        );
        AnalysisContainer::new("who dealt the most damage?")
            .with_section(
                SectionName::RetrievedData,
                "retrieve",
                json!({ "records": [record], "succeeded": 1, "failed": 0 }),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_records_are_handed_to_capability() {
        let capability = MockCapability::new()
            .with_response(CapabilityResponse::text("Ana dealt 114,622 damage."));
        let services = services(capability.clone());
        let container = container_with_data();

        let stage = AnalyzeStage;
        let outcome = stage
            .run(&container, &services, &stage.base_guidance(&container))
            .await
            .unwrap();

        assert_eq!(outcome.narrative.as_deref(), Some("Ana dealt 114,622 damage."));
        let last = capability.last_request().unwrap();
        let records = last.context["records"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["task_id"], "t1");
    }

    #[test]
    fn test_fallback_mentions_no_entities() {
        let stage = AnalyzeStage;
        let outcome = stage.fallback_outcome(&container_with_data());
        let text = outcome.section_value["text"].as_str().unwrap();
        assert!(!text.contains("Ana"));
        assert_eq!(outcome.section_value["fallback"], true);
        assert!(outcome.narrative.is_none());
    }
}
