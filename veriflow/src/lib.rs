//! # Veriflow
//!
//! A fact-verified analysis pipeline: requests are planned into
//! retrieval sub-tasks, sub-tasks fan out concurrently against a
//! read-only data source, and every generated narrative is validated
//! against the retrieved data before it is accepted.
//!
//! - **Immutable-handoff container**: each stage receives an
//!   [`AnalysisContainer`](container::AnalysisContainer) and returns a
//!   new one, with write-once sections and a full processing history
//! - **Claim extraction**: entity, numeric, percentage, and trend
//!   claims are pulled from narrative text with conservative patterns
//! - **Validation gate**: claims are checked against the retrieved
//!   ground truth; discrepancies are itemized, never silently repaired
//! - **Retry with amended guidance**: a tripped gate re-invokes the
//!   stage with the discrepancies spelled out, then substitutes a
//!   conservative fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use veriflow::prelude::*;
//!
//! let runner = PipelineRunner::new(capability, executor, PipelineConfig::new());
//! let container = runner.run("who dealt the most damage?").await;
//! println!("{}", container.final_output().unwrap_or_default());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod claims;
pub mod collab;
pub mod container;
pub mod controller;
pub mod errors;
pub mod gate;
pub mod groundtruth;
pub mod observability;
pub mod runner;
pub mod scheduler;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::claims::{Claim, ClaimExtractor, ClaimKind, TrendDirection};
    pub use crate::collab::{
        CapabilityClient, CapabilityRequest, CapabilityResponse, QueryExecutor, SubTask,
    };
    pub use crate::container::{
        AnalysisContainer, ErrorRecord, ProcessingRecord, RequestIdentity, SectionName,
        StageRunStatus,
    };
    pub use crate::controller::{AttemptDecision, AttemptState, AttemptTracker, RetryPolicy};
    pub use crate::errors::{QueryError, VeriflowError};
    pub use crate::gate::{Discrepancy, DiscrepancyKind, GateConfig, ValidationGate, Verdict};
    pub use crate::groundtruth::{
        Column, ColumnType, ColumnValue, GroundTruth, ResultSet, RetrievedRecord, TaskStatus,
    };
    pub use crate::runner::{PipelineConfig, PipelineRunner};
    pub use crate::scheduler::{SchedulerConfig, TaskScheduler};
    pub use crate::stages::{
        AnalyzeStage, ComposeStage, PlanStage, RetrieveStage, Stage, StageKind, StageOutcome,
        StageServices,
    };
}
