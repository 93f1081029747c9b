//! Core domain model types for shipline.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Typed graph and run identifiers
//! - Action, stage and run status enums
//! - Artifacts and artifact references
//! - Source revisions and run triggers
//! - Lifecycle events

mod artifact;
mod event;
mod ids;
mod revision;
mod status;

pub use artifact::{content_digest, Artifact, ArtifactKey, ArtifactRef};
pub use event::PipelineEvent;
pub use ids::{ActionId, ArtifactId, RunId, StageId};
pub use revision::{SourceRevision, Trigger};
pub use status::{ActionStatus, RunStatus, StageStatus};
