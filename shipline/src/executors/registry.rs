//! Registry of executor capabilities.

use super::{BuildRunner, Deployer, ImagePublisher, SecretsProvider, SourceProvider};
use crate::definition::{ExecutorKind, PipelineGraph};
use crate::errors::DefinitionError;
use std::fmt;
use std::sync::Arc;

/// The capabilities available to an engine.
///
/// Manual approval needs no registration. Every other executor kind used by
/// a pipeline must have a capability before the engine will accept it.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    source: Option<Arc<dyn SourceProvider>>,
    build: Option<Arc<dyn BuildRunner>>,
    publish: Option<Arc<dyn ImagePublisher>>,
    deploy: Option<Arc<dyn Deployer>>,
    secrets: Option<Arc<dyn SecretsProvider>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the source provider.
    #[must_use]
    pub fn with_source(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.source = Some(provider);
        self
    }

    /// Registers the build runner.
    #[must_use]
    pub fn with_build(mut self, runner: Arc<dyn BuildRunner>) -> Self {
        self.build = Some(runner);
        self
    }

    /// Registers the image publisher.
    #[must_use]
    pub fn with_publish(mut self, publisher: Arc<dyn ImagePublisher>) -> Self {
        self.publish = Some(publisher);
        self
    }

    /// Registers the deployer.
    #[must_use]
    pub fn with_deploy(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deploy = Some(deployer);
        self
    }

    /// Registers the secrets provider.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn SecretsProvider>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Returns the source provider.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<dyn SourceProvider>> {
        self.source.as_ref()
    }

    /// Returns the build runner.
    #[must_use]
    pub fn build(&self) -> Option<&Arc<dyn BuildRunner>> {
        self.build.as_ref()
    }

    /// Returns the image publisher.
    #[must_use]
    pub fn publish(&self) -> Option<&Arc<dyn ImagePublisher>> {
        self.publish.as_ref()
    }

    /// Returns the deployer.
    #[must_use]
    pub fn deploy(&self) -> Option<&Arc<dyn Deployer>> {
        self.deploy.as_ref()
    }

    /// Returns the secrets provider.
    #[must_use]
    pub fn secrets(&self) -> Option<&Arc<dyn SecretsProvider>> {
        self.secrets.as_ref()
    }

    /// Returns true if an action of this kind can be executed.
    #[must_use]
    pub fn supports(&self, kind: &ExecutorKind) -> bool {
        match kind {
            ExecutorKind::Source(config) => {
                self.source.is_some() && (config.token_secret.is_none() || self.secrets.is_some())
            }
            ExecutorKind::Build(_) => self.build.is_some(),
            ExecutorKind::Publish(_) => self.publish.is_some(),
            ExecutorKind::Deploy(_) => self.deploy.is_some(),
            ExecutorKind::ManualApproval(_) => true,
        }
    }

    /// Checks that every action of a pipeline has a capability.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::MissingExecutor`] for the first action
    /// that cannot be executed.
    pub fn ensure_supported(&self, graph: &PipelineGraph) -> Result<(), DefinitionError> {
        for action in graph.actions() {
            if self.supports(&action.executor) {
                continue;
            }
            let kind = match &action.executor {
                ExecutorKind::Source(_) if self.source.is_some() => "secrets",
                other => other.label(),
            };
            return Err(DefinitionError::MissingExecutor {
                action: action.name.clone(),
                kind,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("source", &self.source.is_some())
            .field("build", &self.build.is_some())
            .field("publish", &self.publish.is_some())
            .field("deploy", &self.deploy.is_some())
            .field("secrets", &self.secrets.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        ActionDefinition, ApprovalConfig, DeployConfig, PipelineDefinition, SourceConfig,
        StageDefinition,
    };
    use crate::testing::{ScriptedCapabilities, StaticSecrets};

    fn graph(source: SourceConfig) -> PipelineGraph {
        PipelineDefinition::new("web")
            .with_stage(StageDefinition::new("Source").with_action(
                ActionDefinition::source("Fetch", source).with_output("src"),
            ))
            .with_stage(
                StageDefinition::new("Deploy")
                    .with_action(ActionDefinition::approval("Approve", ApprovalConfig::default()))
                    .with_action(
                        ActionDefinition::deploy("Ship", DeployConfig::new("svc"))
                            .with_input("src")
                            .with_run_order(2),
                    ),
            )
            .validate()
            .unwrap()
    }

    #[test]
    fn test_missing_capability_reported() {
        let scripted = Arc::new(ScriptedCapabilities::new());
        let registry = ExecutorRegistry::new().with_source(scripted);

        let err = registry
            .ensure_supported(&graph(SourceConfig::github("acme", "web")))
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::MissingExecutor {
                action: "Ship".to_string(),
                kind: "deploy",
            }
        );
    }

    #[test]
    fn test_token_secret_requires_secrets_provider() {
        let scripted = Arc::new(ScriptedCapabilities::new());
        let registry = ExecutorRegistry::new()
            .with_source(scripted.clone())
            .with_deploy(scripted);
        let graph = graph(SourceConfig::github("acme", "web").with_token_secret("gh-token"));

        let err = registry.ensure_supported(&graph).unwrap_err();
        assert!(matches!(err, DefinitionError::MissingExecutor { kind: "secrets", .. }));

        let registry = registry.with_secrets(Arc::new(StaticSecrets::new().with("gh-token", "t")));
        assert!(registry.ensure_supported(&graph).is_ok());
    }

    #[test]
    fn test_approval_always_supported() {
        let registry = ExecutorRegistry::new();
        assert!(registry.supports(&ExecutorKind::ManualApproval(ApprovalConfig::default())));
        assert!(format!("{registry:?}").contains("source: false"));
    }
}
