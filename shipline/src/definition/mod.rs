//! Pipeline definitions and validation.
//!
//! A [`PipelineDefinition`] is the declarative, serializable description of
//! a pipeline. Validation turns it into a [`PipelineGraph`] with dense
//! integer ids and resolved artifact wiring.

mod builder;
mod executor;
mod graph;
mod spec;

pub use builder::PipelineBuilder;
pub use executor::{
    ApprovalConfig, BuildConfig, ComputeType, DeployConfig, ExecutorKind, PublishConfig,
    SourceConfig,
};
pub use graph::{ActionNode, ArtifactNode, PipelineGraph, RunOrderGroup, StageNode};
pub use spec::{ActionDefinition, PipelineDefinition, StageDefinition};
