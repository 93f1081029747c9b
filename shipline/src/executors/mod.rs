//! Executor capabilities.
//!
//! Source fetch, build, publish and deploy are performed by external
//! collaborators behind the traits in this module. The engine only sees
//! success with a payload, or an [`ExecutorFailure`] whose reason it records
//! verbatim. Manual approval is the one executor implemented in-crate.

mod dispatch;
mod registry;
mod secrets;

pub use dispatch::{ActionContext, ActionDispatcher, ActionOutcome, FailureKind, GateListener};
pub use registry::ExecutorRegistry;
pub use secrets::{Secret, SecretsProvider};

#[cfg(test)]
pub use secrets::MockSecretsProvider;

use crate::core::{Artifact, RunId, SourceRevision};
use crate::definition::{BuildConfig, DeployConfig, PublishConfig, SourceConfig};
use crate::errors::ExecutorFailure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies the action an executor is working for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionScope {
    /// The run.
    pub run_id: RunId,
    /// The pipeline name.
    pub pipeline: String,
    /// The stage name.
    pub stage: String,
    /// The action name.
    pub action: String,
}

/// Fetches a source revision from version control.
#[async_trait]
pub trait SourceProvider: Send + Sync + std::fmt::Debug {
    /// Fetches `revision` and returns the payload of the source artifact.
    async fn fetch(
        &self,
        scope: &ExecutionScope,
        revision: &SourceRevision,
        config: &SourceConfig,
        token: Option<&Secret>,
    ) -> Result<serde_json::Value, ExecutorFailure>;
}

/// Runs a build script against a source artifact.
#[async_trait]
pub trait BuildRunner: Send + Sync + std::fmt::Debug {
    /// Builds `source` and returns the payload of the build output.
    ///
    /// The payload is discarded when the action declares no output.
    async fn build(
        &self,
        scope: &ExecutionScope,
        source: &Artifact,
        config: &BuildConfig,
    ) -> Result<serde_json::Value, ExecutorFailure>;
}

/// Builds a container image and pushes it to a registry.
#[async_trait]
pub trait ImagePublisher: Send + Sync + std::fmt::Debug {
    /// Publishes an image built from `source` and returns the image payload.
    async fn publish(
        &self,
        scope: &ExecutionScope,
        source: &Artifact,
        config: &PublishConfig,
    ) -> Result<serde_json::Value, ExecutorFailure>;
}

/// Rolls an artifact out to a compute target.
#[async_trait]
pub trait Deployer: Send + Sync + std::fmt::Debug {
    /// Deploys `artifact` to the configured target.
    async fn deploy(
        &self,
        scope: &ExecutionScope,
        artifact: &Artifact,
        config: &DeployConfig,
    ) -> Result<(), ExecutorFailure>;
}
