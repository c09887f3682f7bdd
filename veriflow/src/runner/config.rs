//! Pipeline configuration.

use crate::controller::RetryPolicy;
use crate::gate::GateConfig;
use crate::scheduler::SchedulerConfig;
use std::time::Duration;

/// Configuration for a [`PipelineRunner`](super::PipelineRunner).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retry limits applied per stage invocation.
    pub retry: RetryPolicy,
    /// Validation tolerances.
    pub gate: GateConfig,
    /// Retrieval fan-out tuning.
    pub scheduler: SchedulerConfig,
    /// Wall-clock budget for the whole pipeline, unbounded when `None`.
    pub pipeline_deadline: Option<Duration>,
    /// Whether the analysis stage runs between retrieval and composition.
    pub include_analysis: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            gate: GateConfig::default(),
            scheduler: SchedulerConfig::default(),
            pipeline_deadline: None,
            include_analysis: true,
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration with the analysis stage enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the validation tolerances.
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Sets the scheduler tuning.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sets the whole-pipeline deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.pipeline_deadline = Some(deadline);
        self
    }

    /// Enables or disables the analysis stage.
    #[must_use]
    pub fn with_analysis(mut self, include_analysis: bool) -> Self {
        self.include_analysis = include_analysis;
        self
    }
}
