//! The retrieval stage: fans out the planned sub-tasks.

use super::{Stage, StageKind, StageOutcome, StageServices};
use crate::collab::SubTask;
use crate::container::{AnalysisContainer, ErrorRecord, SectionName};
use crate::errors::VeriflowError;
use crate::groundtruth::RetrievedRecord;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Executes the planned sub-tasks concurrently and captures their result
/// sets verbatim as ground truth.
///
/// Partial failure is tolerated; when every sub-task fails there is no
/// ground truth to validate anything against, so the failure is fatal.
#[derive(Debug, Default)]
pub struct RetrieveStage;

impl RetrieveStage {
    fn planned_tasks(container: &AnalysisContainer) -> Vec<SubTask> {
        container
            .section(SectionName::Plan)
            .and_then(|plan| plan.get("sub_tasks"))
            .and_then(|tasks| serde_json::from_value(tasks.clone()).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Stage for RetrieveStage {
    fn kind(&self) -> StageKind {
        StageKind::Retrieve
    }

    fn section(&self) -> SectionName {
        SectionName::RetrievedData
    }

    fn recoverable(&self) -> bool {
        false
    }

    fn base_guidance(&self, _container: &AnalysisContainer) -> String {
        String::new()
    }

    async fn run(
        &self,
        container: &AnalysisContainer,
        services: &StageServices,
        _guidance: &str,
    ) -> Result<StageOutcome, VeriflowError> {
        let tasks = Self::planned_tasks(container);
        if tasks.is_empty() {
            return Err(VeriflowError::AllSubTasksFailed {
                stage: self.kind().as_str().to_string(),
                count: 0,
            });
        }

        let records = services.scheduler.run_batch(tasks).await;
        let succeeded = records.iter().filter(|r| r.status.is_success()).count();
        let failed = records.len() - succeeded;
        info!(succeeded, failed, "retrieval batch finished");

        if succeeded == 0 {
            return Err(VeriflowError::AllSubTasksFailed {
                stage: self.kind().as_str().to_string(),
                count: records.len(),
            });
        }

        let annotations = records
            .iter()
            .filter_map(failure_annotation)
            .collect::<Vec<_>>();

        Ok(StageOutcome::section(json!({
            "records": records,
            "succeeded": succeeded,
            "failed": failed,
        }))
        .with_annotations(annotations))
    }

    fn fallback_outcome(&self, _container: &AnalysisContainer) -> StageOutcome {
        // Unreachable while the stage is non-recoverable; kept minimal.
        StageOutcome::section(json!({
            "records": [],
            "succeeded": 0,
            "failed": 0,
        }))
    }
}

fn failure_annotation(record: &RetrievedRecord) -> Option<ErrorRecord> {
    let crate::groundtruth::TaskStatus::Failed { error } = &record.status else {
        return None;
    };
    let failure = VeriflowError::SubTaskFailure {
        task_id: record.task_id.clone(),
        reason: error.clone(),
    };
    Some(
        ErrorRecord::new("retrieve", failure.kind(), failure.to_string())
            .with_recovery("continued with partial results"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groundtruth::{Column, ColumnType, ColumnValue, ResultSet};
    use crate::scheduler::{SchedulerConfig, TaskScheduler};
    use crate::testing::{MockCapability, MockExecutor};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn services(executor: MockExecutor) -> StageServices {
        StageServices {
            capability: Arc::new(MockCapability::new()),
            scheduler: TaskScheduler::new(Arc::new(executor), SchedulerConfig::default()),
        }
    }

    fn planned_container(tasks: &[(&str, &str)]) -> AnalysisContainer {
        let sub_tasks: Vec<SubTask> = tasks
            .iter()
            .map(|(id, query)| SubTask::new(*id, "test", *query))
            .collect();
        AnalysisContainer::new("q")
            .with_section(
                SectionName::Plan,
                "plan",
                json!({ "plan": "p", "sub_tasks": sub_tasks }),
            )
            .unwrap()
    }

    fn one_row() -> ResultSet {
        ResultSet::new(vec![Column::new("n", ColumnType::Integer)])
            .with_row(vec![ColumnValue::Integer(1)])
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let services = services(
            MockExecutor::new()
                .with_result("q1", one_row())
                .with_error("q2", "boom"),
        );
        let container = planned_container(&[("t1", "q1"), ("t2", "q2")]);

        let stage = RetrieveStage;
        let outcome = stage.run(&container, &services, "").await.unwrap();

        assert_eq!(outcome.section_value["succeeded"], 1);
        assert_eq!(outcome.section_value["failed"], 1);
        assert_eq!(outcome.annotations.len(), 1);
        assert_eq!(outcome.annotations[0].kind, "sub_task_failure");
        assert!(outcome.annotations[0].handled);
    }

    #[tokio::test]
    async fn test_all_failed_is_fatal() {
        let services = services(
            MockExecutor::new()
                .with_error("q1", "boom")
                .with_error("q2", "boom"),
        );
        let container = planned_container(&[("t1", "q1"), ("t2", "q2")]);

        let stage = RetrieveStage;
        let err = stage.run(&container, &services, "").await.unwrap_err();
        assert!(matches!(
            err,
            VeriflowError::AllSubTasksFailed { count: 2, .. }
        ));
        assert!(!err.is_recoverable());
        assert!(!stage.recoverable());
    }

    #[tokio::test]
    async fn test_empty_plan_is_fatal() {
        let services = services(MockExecutor::new());
        let container = planned_container(&[]);

        let stage = RetrieveStage;
        let err = stage.run(&container, &services, "").await.unwrap_err();
        assert!(matches!(
            err,
            VeriflowError::AllSubTasksFailed { count: 0, .. }
        ));
    }
}
