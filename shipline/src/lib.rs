//! # Shipline
//!
//! A stage-sequenced deployment pipeline engine.
//!
//! Shipline executes pipelines of the shape source → test → build → publish →
//! deploy, with support for:
//!
//! - **Validated wiring**: pipeline definitions are checked as a typed graph
//!   before any run starts, so duplicate producers and dangling artifact
//!   references never surface mid-run
//! - **Run order groups**: actions sharing a run order run concurrently; later
//!   groups wait for every earlier one to succeed
//! - **Artifact handoff**: write-once, content-addressed artifacts flow from
//!   producer to consumers through an [`ArtifactStore`](artifacts::ArtifactStore)
//! - **Approval gates**: a run suspends on a manual gate until an external
//!   approve or reject decision arrives
//! - **Pluggable executors**: source fetch, build, publish and deploy are
//!   capabilities supplied by the host
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shipline::prelude::*;
//!
//! let definition = PipelineDefinition::new("storefront")
//!     .with_stage(StageDefinition::new("Source").with_action(
//!         ActionDefinition::source("Checkout", SourceConfig::github("acme", "storefront"))
//!             .with_output("src"),
//!     ))
//!     .with_stage(StageDefinition::new("Build").with_action(
//!         ActionDefinition::build("Compile", BuildConfig::new("buildspec.yml"))
//!             .with_input("src")
//!             .with_output("build"),
//!     ));
//!
//! let engine = PipelineEngine::builder(definition)
//!     .with_executors(ExecutorRegistry::new().with_source(git).with_build(runner))
//!     .build()?;
//!
//! let report = engine.run(SourceRevision::new("3f2c1ab").with_branch("main")).await?;
//! assert!(report.is_success());
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

pub mod approval;
pub mod artifacts;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod definition;
pub mod engine;
pub mod errors;
pub mod events;
pub mod executors;
pub mod observability;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::approval::{ApprovalBroker, ApprovalDecision, ApprovalRecord, Verdict};
    pub use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EngineConfig, LogFormat, LoggingConfig};
    pub use crate::core::{
        Artifact, ArtifactRef, PipelineEvent, RunId, RunStatus, SourceRevision, StageStatus,
        Trigger,
    };
    pub use crate::definition::{
        ActionDefinition, ApprovalConfig, BuildConfig, DeployConfig, ExecutorKind,
        PipelineBuilder, PipelineDefinition, PipelineGraph, PublishConfig, SourceConfig,
        StageDefinition,
    };
    pub use crate::engine::{FailureInfo, PipelineEngine, RunHandle, RunReport};
    pub use crate::errors::{
        ApprovalError, ArtifactStoreError, DefinitionError, ExecutorFailure, RunError,
        ShiplineError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executors::{
        BuildRunner, Deployer, ExecutionScope, ExecutorRegistry, FailureKind, ImagePublisher,
        Secret, SecretsProvider, SourceProvider,
    };
    pub use crate::observability::init_tracing;
    pub use crate::utils::{iso_timestamp, now_utc, Timestamp};
}
