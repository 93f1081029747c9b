//! Run execution.
//!
//! A [`PipelineEngine`] owns one validated pipeline graph. Every trigger
//! creates an independent run that walks the stages in declaration order,
//! dispatching each stage's run order groups through the executor
//! capabilities and handing artifacts forward through the artifact store.

mod handle;
mod pipeline_engine;
mod report;
mod stage_runner;
mod state;


pub use handle::RunHandle;
pub use pipeline_engine::{EngineBuilder, PipelineEngine};
pub use report::{ActionReport, RunReport, StageReport};
pub use state::FailureInfo;
