//! The sequential pipeline runner.
//!
//! Stages run in order, each through an attempt loop of validate, retry
//! with amended guidance, then fallback. Whatever happens, the returned
//! container carries a final output and a complete processing history.

mod config;

pub use config::PipelineConfig;

use crate::collab::{CapabilityClient, QueryExecutor};
use crate::container::{AnalysisContainer, ErrorRecord, SectionName, StageRunStatus};
use crate::controller::{AttemptDecision, AttemptTracker};
use crate::errors::VeriflowError;
use crate::gate::{ValidationGate, Verdict};
use crate::scheduler::TaskScheduler;
use crate::stages::{
    AnalyzeStage, ComposeStage, PlanStage, RetrieveStage, Stage, StageOutcome, StageServices,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout_at;
use tracing::{info, warn};

/// Outcome of one stage's full attempt loop.
enum StageRun {
    /// An attempt passed the gate (or produced non-narrative output).
    Accepted {
        outcome: StageOutcome,
        verdicts: Vec<Verdict>,
    },
    /// Retries were exhausted; the fallback outcome stands in.
    Fallback {
        outcome: StageOutcome,
        verdicts: Vec<Verdict>,
        record: ErrorRecord,
    },
    /// A non-recoverable failure; the pipeline aborts.
    Fatal { error: VeriflowError },
}

/// Runs the plan, retrieve, analyze, compose sequence over a container.
pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    services: StageServices,
    gate: ValidationGate,
    config: PipelineConfig,
}

impl PipelineRunner {
    /// Creates a runner over the given collaborators.
    #[must_use]
    pub fn new(
        capability: Arc<dyn CapabilityClient>,
        executor: Arc<dyn QueryExecutor>,
        config: PipelineConfig,
    ) -> Self {
        let scheduler = TaskScheduler::new(executor, config.scheduler.clone());
        let services = StageServices {
            capability,
            scheduler,
        };

        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(PlanStage), Box::new(RetrieveStage)];
        if config.include_analysis {
            stages.push(Box::new(AnalyzeStage));
        }
        stages.push(Box::new(ComposeStage));

        Self {
            stages,
            services,
            gate: ValidationGate::new(config.gate.clone()),
            config,
        }
    }

    /// Runs the pipeline for a new request.
    pub async fn run(&self, request: impl Into<String>) -> AnalysisContainer {
        self.run_container(AnalysisContainer::new(request)).await
    }

    /// Runs the pipeline for a follow-on request, carrying the prior
    /// container's ground truth forward as read-only seed context.
    pub async fn run_followup(
        &self,
        prior: &AnalysisContainer,
        request: impl Into<String>,
    ) -> AnalysisContainer {
        self.run_container(prior.seed_followup(request)).await
    }

    /// Runs the pipeline over a prepared container.
    ///
    /// The returned container always has a final output: the composed
    /// narrative, a stage fallback, or a conservative notice on abort.
    pub async fn run_container(&self, mut container: AnalysisContainer) -> AnalysisContainer {
        let deadline = self
            .config
            .pipeline_deadline
            .map(|d| tokio::time::Instant::now() + d);

        for stage in &self.stages {
            let stage_name = stage.kind().as_str();
            let start = Instant::now();
            container = container.begin_stage(stage_name);
            info!(stage = stage_name, "stage started");

            let run = match deadline {
                Some(deadline) => {
                    let attempt =
                        timeout_at(deadline, self.run_stage(stage.as_ref(), &container)).await;
                    attempt.ok()
                }
                None => Some(self.run_stage(stage.as_ref(), &container).await),
            };

            let Some(run) = run else {
                warn!(stage = stage_name, "pipeline deadline exceeded");
                let error = VeriflowError::StageTimeout {
                    stage: stage_name.to_string(),
                    timeout_ms: self
                        .config
                        .pipeline_deadline
                        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                };
                container = Self::abort(
                    container,
                    ErrorRecord::new(stage_name, error.kind(), error.to_string()).unhandled(),
                    elapsed_ms(start),
                );
                break;
            };

            match run {
                StageRun::Accepted { outcome, verdicts } => {
                    container = Self::apply(container, verdicts, outcome.annotations);
                    container = Self::write_section(
                        container,
                        stage.section(),
                        stage_name,
                        outcome.section_value,
                    );
                    if container.aborted {
                        container =
                            container.finish_stage(StageRunStatus::Failed, elapsed_ms(start));
                        break;
                    }
                    container =
                        container.finish_stage(StageRunStatus::Succeeded, elapsed_ms(start));
                    info!(stage = stage_name, "stage succeeded");
                }
                StageRun::Fallback {
                    outcome,
                    verdicts,
                    record,
                } => {
                    container = Self::apply(container, verdicts, outcome.annotations);
                    container = container.annotate_error(record);
                    container = Self::write_section(
                        container,
                        stage.section(),
                        stage_name,
                        outcome.section_value,
                    );
                    if container.aborted {
                        container =
                            container.finish_stage(StageRunStatus::Failed, elapsed_ms(start));
                        break;
                    }
                    container = container
                        .finish_stage(StageRunStatus::FallbackEmitted, elapsed_ms(start));
                    warn!(stage = stage_name, "stage emitted fallback output");
                }
                StageRun::Fatal { error } => {
                    warn!(stage = stage_name, error = %error, "stage failed, aborting");
                    container = Self::abort(
                        container,
                        ErrorRecord::new(stage_name, error.kind(), error.to_string()).unhandled(),
                        elapsed_ms(start),
                    );
                    break;
                }
            }
        }

        container.current_stage = None;
        self.ensure_final_output(container)
    }

    /// Runs one stage's attempt loop to a terminal decision.
    async fn run_stage(&self, stage: &dyn Stage, container: &AnalysisContainer) -> StageRun {
        let stage_name = stage.kind().as_str();
        let base_guidance = stage.base_guidance(container);
        let mut guidance = base_guidance.clone();
        let mut tracker = AttemptTracker::new(stage_name, self.config.retry.clone());
        let mut verdicts = Vec::new();

        loop {
            match stage.run(container, &self.services, &guidance).await {
                Ok(outcome) => {
                    let Some(narrative) = outcome.narrative.clone() else {
                        return StageRun::Accepted { outcome, verdicts };
                    };

                    let ground_truth = container.ground_truth();
                    let known_entities = ground_truth.known_entities();
                    let verdict = self.gate.validate(&narrative, &ground_truth, &known_entities);
                    verdicts.push(verdict.clone());

                    match tracker.decide(&base_guidance, &narrative, &verdict) {
                        AttemptDecision::Accept => {
                            return StageRun::Accepted { outcome, verdicts };
                        }
                        AttemptDecision::Retry { amended_guidance } => {
                            guidance = amended_guidance;
                        }
                        AttemptDecision::Fallback => {
                            let error = VeriflowError::ValidationTripwire {
                                stage: stage_name.to_string(),
                                summary: verdict.itemize(),
                            };
                            let record =
                                ErrorRecord::new(stage_name, error.kind(), error.to_string())
                                    .with_recovery("fallback output substituted");
                            return StageRun::Fallback {
                                outcome: stage.fallback_outcome(container),
                                verdicts,
                                record,
                            };
                        }
                    }
                }
                Err(error) if error.is_recoverable() && stage.recoverable() => {
                    warn!(stage = stage_name, error = %error, "stage attempt failed");
                    match tracker.note_failure(&base_guidance) {
                        AttemptDecision::Retry { amended_guidance } => {
                            guidance = amended_guidance;
                        }
                        _ => {
                            let record =
                                ErrorRecord::new(stage_name, error.kind(), error.to_string())
                                    .with_recovery("fallback output substituted");
                            return StageRun::Fallback {
                                outcome: stage.fallback_outcome(container),
                                verdicts,
                                record,
                            };
                        }
                    }
                }
                Err(error) => return StageRun::Fatal { error },
            }
        }
    }

    fn apply(
        mut container: AnalysisContainer,
        verdicts: Vec<Verdict>,
        annotations: Vec<ErrorRecord>,
    ) -> AnalysisContainer {
        for verdict in verdicts {
            container = container.record_verdict(verdict);
        }
        for record in annotations {
            container = container.annotate_error(record);
        }
        container
    }

    /// Finalizes a section, turning a write-once conflict into an abort
    /// instead of losing the container.
    fn write_section(
        container: AnalysisContainer,
        name: SectionName,
        stage: &str,
        value: serde_json::Value,
    ) -> AnalysisContainer {
        let checkpoint = container.clone();
        match container.with_section(name, stage, value) {
            Ok(next) => next,
            Err(error) => checkpoint
                .annotate_error(
                    ErrorRecord::new(stage, error.kind(), error.to_string()).unhandled(),
                )
                .mark_aborted(),
        }
    }

    fn abort(
        container: AnalysisContainer,
        record: ErrorRecord,
        duration_ms: f64,
    ) -> AnalysisContainer {
        container
            .annotate_error(record)
            .finish_stage(StageRunStatus::Aborted, duration_ms)
            .mark_aborted()
    }

    /// Finalizes the output section: the accepted narrative when one was
    /// composed, a conservative notice otherwise. Guarantees a final
    /// output even after an abort.
    fn ensure_final_output(&self, container: AnalysisContainer) -> AnalysisContainer {
        if container.final_output().is_some() {
            return container;
        }
        let value = match container
            .section(SectionName::Narrative)
            .and_then(|v| v.get("text"))
            .and_then(serde_json::Value::as_str)
        {
            Some(narrative) => json!({ "text": narrative }),
            None => json!({
                "text": "The request could not be completed. Partial progress \
                         and errors are recorded in the analysis container.",
                "fallback": true,
            }),
        };
        Self::write_section(container, SectionName::FinalOutput, "pipeline", value)
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{CapabilityResponse, SubTask};
    use crate::controller::RetryPolicy;
    use crate::testing::{damage_result_set, declining_gold_result_set, MockCapability, MockExecutor};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn plan_response(tasks: &[(&str, &str, &str)]) -> CapabilityResponse {
        CapabilityResponse::text("plan").with_sub_requests(
            tasks
                .iter()
                .map(|(id, purpose, query)| SubTask::new(*id, *purpose, *query))
                .collect(),
        )
    }

    fn runner(capability: &MockCapability, executor: &MockExecutor, config: PipelineConfig) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(capability.clone()),
            Arc::new(executor.clone()),
            config,
        )
    }

    #[tokio::test]
    async fn test_happy_path_produces_verified_output() {
        let capability = MockCapability::new()
            .with_response(plan_response(&[("t1", "damage totals", "SELECT damage")]))
            .with_text("Ana dealt 114,622 damage, ahead of Bo.")
            .with_text("Ana led the match with a total damage of 114,622.");
        let executor = MockExecutor::new().with_result("SELECT damage", damage_result_set());

        let container = runner(&capability, &executor, PipelineConfig::new())
            .run("who dealt the most damage?")
            .await;

        assert!(!container.aborted);
        assert_eq!(
            container.final_output(),
            Some("Ana led the match with a total damage of 114,622.")
        );
        let statuses: Vec<StageRunStatus> =
            container.history().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageRunStatus::Succeeded,
                StageRunStatus::Succeeded,
                StageRunStatus::Succeeded,
                StageRunStatus::Succeeded,
            ]
        );
        assert_eq!(capability.call_count(), 3);
        assert!(!container.has_errors());
        // The retrieved section reflects the batch outcome.
        let retrieved = container.section(SectionName::RetrievedData).unwrap();
        assert_eq!(retrieved["succeeded"], 1);
        // The composer owns the narrative; the runner finalizes the output.
        assert_eq!(
            container.section_written_by(SectionName::Narrative),
            Some("compose")
        );
        assert_eq!(
            container.section_written_by(SectionName::FinalOutput),
            Some("pipeline")
        );
    }

    #[tokio::test]
    async fn test_fabrication_retries_then_falls_back() {
        // The composer insists on an entity that was never retrieved; the
        // response queue repeats it for every retry.
        let capability = MockCapability::new()
            .with_response(plan_response(&[("t1", "damage totals", "SELECT damage")]))
            .with_text("Cid dealt the most damage of anyone.");
        let executor = MockExecutor::new().with_result("SELECT damage", damage_result_set());
        let config = PipelineConfig::new().with_analysis(false);

        let container = runner(&capability, &executor, config)
            .run("who dealt the most damage?")
            .await;

        // One plan call plus the first attempt and two retries.
        assert_eq!(capability.call_count(), 4);
        assert!(!container.aborted);

        let compose_record = container
            .history()
            .iter()
            .find(|r| r.stage == "compose")
            .unwrap();
        assert_eq!(compose_record.status, StageRunStatus::FallbackEmitted);
        assert_eq!(compose_record.verdicts.len(), 3);
        assert!(compose_record.verdicts.iter().all(Verdict::tripwire));

        // The last retry guidance itemized the discrepancy.
        let guidance = capability.last_guidance().unwrap();
        assert!(guidance.contains("fabricated_entity"));
        assert!(guidance.contains("Cid"));

        // The fallback output stands and makes no claims about Cid.
        let output = container.final_output().unwrap();
        assert!(!output.contains("Cid"));
        assert!(container
            .errors()
            .iter()
            .any(|e| e.kind == "validation_tripwire" && e.handled));
    }

    #[tokio::test]
    async fn test_all_retrieval_failures_abort_with_final_output() {
        let capability = MockCapability::new().with_response(plan_response(&[
            ("t1", "damage", "SELECT damage"),
            ("t2", "healing", "SELECT healing"),
        ]));
        let executor = MockExecutor::new()
            .with_error("SELECT damage", "connection refused")
            .with_error("SELECT healing", "connection refused");

        let container = runner(&capability, &executor, PipelineConfig::new())
            .run("who dealt the most damage?")
            .await;

        assert!(container.aborted);
        let retrieve_record = container
            .history()
            .iter()
            .find(|r| r.stage == "retrieve")
            .unwrap();
        assert_eq!(retrieve_record.status, StageRunStatus::Aborted);
        assert!(container
            .errors()
            .iter()
            .any(|e| e.kind == "all_sub_tasks_failed" && !e.handled));

        // Even an aborted run hands back a container with a final output.
        assert!(container.final_output().is_some());
        assert_eq!(
            container.section_written_by(SectionName::FinalOutput),
            Some("pipeline")
        );
    }

    #[tokio::test]
    async fn test_partial_retrieval_failure_continues() {
        let capability = MockCapability::new()
            .with_response(plan_response(&[
                ("t1", "damage", "SELECT damage"),
                ("t2", "healing", "SELECT healing"),
            ]))
            .with_text("Ana dealt 114,622 damage.")
            .with_text("Ana led with a total damage of 114,622.");
        let executor = MockExecutor::new()
            .with_result("SELECT damage", damage_result_set())
            .with_error("SELECT healing", "table missing");

        let container = runner(&capability, &executor, PipelineConfig::new())
            .run("who dealt the most damage?")
            .await;

        assert!(!container.aborted);
        assert!(container
            .errors()
            .iter()
            .any(|e| e.kind == "sub_task_failure" && e.handled));
        assert!(container.final_output().is_some());
    }

    #[tokio::test]
    async fn test_capability_errors_exhaust_into_fallback_plan() {
        let capability = MockCapability::failing("backend unavailable");
        let executor = MockExecutor::new();
        let config = PipelineConfig::new().with_retry(RetryPolicy {
            max_retries: 1,
            stagnation_limit: 2,
        });

        let container = runner(&capability, &executor, config).run("q").await;

        // Planning fell back to an empty task list, so retrieval aborted.
        assert_eq!(capability.call_count(), 2);
        assert!(container.aborted);
        assert!(container.final_output().is_some());
        let plan_record = container
            .history()
            .iter()
            .find(|r| r.stage == "plan")
            .unwrap();
        assert_eq!(plan_record.status, StageRunStatus::FallbackEmitted);
    }

    #[tokio::test]
    async fn test_deadline_aborts_mid_pipeline() {
        let capability = MockCapability::new()
            .with_response(plan_response(&[("t1", "damage", "SELECT damage")]));
        let executor = MockExecutor::new()
            .with_result("SELECT damage", damage_result_set())
            .with_delay("SELECT damage", Duration::from_millis(300));
        let config = PipelineConfig::new().with_deadline(Duration::from_millis(60));

        let container = runner(&capability, &executor, config).run("q").await;

        assert!(container.aborted);
        assert!(container
            .errors()
            .iter()
            .any(|e| e.kind == "stage_timeout" && !e.handled));
        assert!(container.final_output().is_some());
    }

    #[tokio::test]
    async fn test_trend_contradiction_is_caught() {
        let capability = MockCapability::new()
            .with_response(plan_response(&[("t1", "gold per phase", "SELECT gold")]))
            .with_text("Gold per minute was increasing across the match.")
            // The amended retry corrects the direction.
            .with_text("Gold per minute was declining across the match.")
            .with_text("The data shows the pace slowed over time.");
        let executor = MockExecutor::new().with_result("SELECT gold", declining_gold_result_set());

        let container = runner(&capability, &executor, PipelineConfig::new())
            .run("how did the gold economy develop?")
            .await;

        assert!(!container.aborted);
        let analyze_record = container
            .history()
            .iter()
            .find(|r| r.stage == "analyze")
            .unwrap();
        assert_eq!(analyze_record.status, StageRunStatus::Succeeded);
        assert_eq!(analyze_record.verdicts.len(), 2);
        assert!(analyze_record.verdicts[0].tripwire());
        assert!(!analyze_record.verdicts[1].tripwire());
    }

    #[tokio::test]
    async fn test_followup_reuses_session_and_ground_truth() {
        let capability = MockCapability::new()
            .with_response(plan_response(&[("t1", "damage", "SELECT damage")]))
            .with_text("Ana dealt 114,622 damage.")
            .with_text("Ana led with a total damage of 114,622.");
        let executor = MockExecutor::new().with_result("SELECT damage", damage_result_set());
        let runner = runner(&capability, &executor, PipelineConfig::new());

        let first = runner.run("who dealt the most damage?").await;
        assert!(!first.aborted);

        let followup_capability_calls = capability.call_count();
        let second = runner.run_followup(&first, "and how about Bo?").await;

        assert_eq!(second.identity.session_id, first.identity.session_id);
        assert_ne!(second.identity.request_id, first.identity.request_id);
        assert_eq!(second.input.prior_requests, vec!["who dealt the most damage?"]);
        // Seed ground truth is available before the second retrieval runs.
        assert!(!second.input.seed_ground_truth.is_empty());
        assert!(capability.call_count() > followup_capability_calls);
    }
}
