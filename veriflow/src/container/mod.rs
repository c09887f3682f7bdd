//! The state container: an immutable-handoff accumulating record threaded
//! through the pipeline, with sectioned data and a processing-history log.

#[allow(clippy::module_inception)]
mod container;
mod history;
mod identity;

pub use container::{AnalysisContainer, RequestInput, SectionEntry, SectionName};
pub use history::{ErrorRecord, ProcessingRecord, StageRunStatus};
pub use identity::RequestIdentity;
