//! Event sinks for pipeline lifecycle events.
//!
//! The engine emits a [`PipelineEvent`](crate::core::PipelineEvent) for
//! every run, stage, action, approval and artifact transition. Each engine
//! owns its sink; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
