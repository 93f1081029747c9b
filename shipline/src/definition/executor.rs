//! Executor kinds and their per-kind configuration.
//!
//! Every action is bound to exactly one executor kind. The kind decides which
//! external capability performs the work and how many artifacts the action
//! may consume and produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// The executor an action is bound to, with its kind-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Fetch a source revision from version control.
    Source(SourceConfig),
    /// Run a build script against a source artifact.
    Build(BuildConfig),
    /// Build a container image and push it to a registry.
    Publish(PublishConfig),
    /// Roll an artifact out to a compute target.
    Deploy(DeployConfig),
    /// Wait for a human Approve/Reject decision.
    ManualApproval(ApprovalConfig),
}

impl ExecutorKind {
    /// Returns the kind label used in definitions and diagnostics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Build(_) => "build",
            Self::Publish(_) => "publish",
            Self::Deploy(_) => "deploy",
            Self::ManualApproval(_) => "manual_approval",
        }
    }

    /// Returns true for approval gates.
    #[must_use]
    pub fn is_approval(&self) -> bool {
        matches!(self, Self::ManualApproval(_))
    }

    /// Allowed number of input artifacts.
    #[must_use]
    pub fn input_arity(&self) -> RangeInclusive<usize> {
        match self {
            Self::Source(_) | Self::ManualApproval(_) => 0..=0,
            Self::Build(_) | Self::Publish(_) | Self::Deploy(_) => 1..=1,
        }
    }

    /// Allowed number of output artifacts.
    #[must_use]
    pub fn output_arity(&self) -> RangeInclusive<usize> {
        match self {
            Self::Source(_) => 1..=1,
            Self::Build(_) | Self::Publish(_) => 0..=1,
            Self::Deploy(_) | Self::ManualApproval(_) => 0..=0,
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configuration for a source fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// The version control provider (e.g. "github").
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Repository owner or organization.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to track.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Name of the secret holding the access token, resolved per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,
}

fn default_provider() -> String {
    "github".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

impl SourceConfig {
    /// Creates a GitHub source on the `main` branch.
    #[must_use]
    pub fn github(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            owner: owner.into(),
            repo: repo.into(),
            branch: default_branch(),
            token_secret: None,
        }
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Sets the secret that holds the access token.
    #[must_use]
    pub fn with_token_secret(mut self, name: impl Into<String>) -> Self {
        self.token_secret = Some(name.into());
        self
    }

    /// Returns `owner/repo`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Size class of the build host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeType {
    /// Small build host.
    Small,
    /// Medium build host.
    #[default]
    Medium,
    /// Large build host.
    Large,
}

/// Configuration for a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Path of the build script inside the source (e.g. "buildspec_test.yml").
    pub script: String,
    /// Environment variables exported to the script.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Build host size.
    #[serde(default)]
    pub compute: ComputeType,
    /// Whether the build needs privileged mode (e.g. to run a container daemon).
    #[serde(default)]
    pub privileged: bool,
    /// Build image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl BuildConfig {
    /// Creates a build running the given script.
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            environment: BTreeMap::new(),
            compute: ComputeType::default(),
            privileged: false,
            image: None,
        }
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Sets the compute type.
    #[must_use]
    pub fn with_compute(mut self, compute: ComputeType) -> Self {
        self.compute = compute;
        self
    }

    /// Enables privileged mode.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}

/// Configuration for building and pushing a container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Registry repository URI.
    pub registry: String,
    /// Image tag.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Optional build script driving the image build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Signing profile used to sign the pushed image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_profile: Option<String>,
    /// Environment variables exported to the image build.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl PublishConfig {
    /// Creates a publish step pushing `latest` to the registry.
    #[must_use]
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            tag: default_tag(),
            script: None,
            signing_profile: None,
            environment: BTreeMap::new(),
        }
    }

    /// Sets the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the image build script.
    #[must_use]
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Sets the signing profile.
    #[must_use]
    pub fn with_signing_profile(mut self, profile: impl Into<String>) -> Self {
        self.signing_profile = Some(profile.into());
        self
    }

    /// Returns `registry:tag`.
    #[must_use]
    pub fn image_uri(&self) -> String {
        format!("{}:{}", self.registry, self.tag)
    }
}

/// Configuration for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// The compute target (e.g. a service name).
    pub target: String,
    /// Logical environment name (e.g. "test", "prod").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl DeployConfig {
    /// Creates a deployment to the named target.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            environment: None,
        }
    }

    /// Sets the environment name.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

/// Configuration for a manual approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Instructions shown to the approver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Link for the approver to review (e.g. the test deployment URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    /// Overrides the engine's approval timeout for this gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ApprovalConfig {
    /// Sets the approver instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Sets the review link.
    #[must_use]
    pub fn with_external_link(mut self, link: impl Into<String>) -> Self {
        self.external_link = Some(link.into());
        self
    }

    /// Sets the gate timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_kind_tagged_serialization() {
        let kind = ExecutorKind::Deploy(DeployConfig::new("fargate-test").with_environment("test"));
        let json = serde_json::to_value(&kind).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"kind": "deploy", "target": "fargate-test", "environment": "test"})
        );
    }

    #[test]
    fn test_source_defaults() {
        let kind: ExecutorKind =
            serde_json::from_str(r#"{"kind": "source", "owner": "acme", "repo": "web"}"#).unwrap();

        match kind {
            ExecutorKind::Source(config) => {
                assert_eq!(config.provider, "github");
                assert_eq!(config.branch, "main");
                assert_eq!(config.full_name(), "acme/web");
            }
            other => panic!("unexpected kind: {other}"),
        }
    }

    #[test]
    fn test_publish_defaults_to_latest() {
        let kind: ExecutorKind =
            serde_json::from_str(r#"{"kind": "publish", "registry": "123.dkr.ecr/web"}"#).unwrap();

        match kind {
            ExecutorKind::Publish(config) => assert_eq!(config.image_uri(), "123.dkr.ecr/web:latest"),
            other => panic!("unexpected kind: {other}"),
        }
    }

    #[test]
    fn test_approval_has_no_artifacts() {
        let kind = ExecutorKind::ManualApproval(ApprovalConfig::default());
        assert!(kind.is_approval());
        assert_eq!(kind.input_arity(), 0..=0);
        assert_eq!(kind.output_arity(), 0..=0);
        assert_eq!(kind.label(), "manual_approval");
    }

    #[test]
    fn test_build_config_builder() {
        let config = BuildConfig::new("buildspec_docker.yml")
            .with_env("IMAGE_TAG", "latest")
            .with_compute(ComputeType::Large)
            .privileged();

        assert!(config.privileged);
        assert_eq!(config.compute, ComputeType::Large);
        assert_eq!(config.environment.get("IMAGE_TAG").map(String::as_str), Some("latest"));
    }
}
