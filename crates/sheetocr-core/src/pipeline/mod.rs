//! The extraction pipeline and its batch orchestration.

mod extract;
mod orchestrator;
mod report;
mod retry;
mod state;

pub use extract::{fail_all, ExtractionResult, JobOutcome, RegionPipeline};
pub use orchestrator::{CancelToken, EntityObserver, Orchestrator};
pub use report::{EntityReport, RunReport};
pub use retry::{retry, RetryPolicy};
pub use state::{EntityState, Stage};
