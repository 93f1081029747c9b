//! Pipeline, stage and action definitions.
//!
//! This is the declarative surface a caller authors and persists. It is
//! purely data; [`PipelineGraph::from_definition`] turns it into a validated
//! graph the engine can run.

use super::{
    ApprovalConfig, BuildConfig, DeployConfig, ExecutorKind, PipelineGraph, PublishConfig,
    SourceConfig,
};
use crate::errors::{DefinitionError, ShiplineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_run_order() -> u32 {
    1
}

/// Definition of a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Pipeline-unique action name.
    pub name: String,
    /// The executor kind and its configuration.
    #[serde(alias = "executorKind")]
    pub executor: ExecutorKind,
    /// Intra-stage ordering group. Lower groups finish before higher ones start.
    #[serde(default = "default_run_order", alias = "runOrder")]
    pub run_order: u32,
    /// Names of consumed artifacts.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names of produced artifacts.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl ActionDefinition {
    /// Creates a new action with `run_order = 1` and no artifacts.
    #[must_use]
    pub fn new(name: impl Into<String>, executor: ExecutorKind) -> Self {
        Self {
            name: name.into(),
            executor,
            run_order: default_run_order(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Creates a source fetch action.
    #[must_use]
    pub fn source(name: impl Into<String>, config: SourceConfig) -> Self {
        Self::new(name, ExecutorKind::Source(config))
    }

    /// Creates a build action.
    #[must_use]
    pub fn build(name: impl Into<String>, config: BuildConfig) -> Self {
        Self::new(name, ExecutorKind::Build(config))
    }

    /// Creates a publish action.
    #[must_use]
    pub fn publish(name: impl Into<String>, config: PublishConfig) -> Self {
        Self::new(name, ExecutorKind::Publish(config))
    }

    /// Creates a deploy action.
    #[must_use]
    pub fn deploy(name: impl Into<String>, config: DeployConfig) -> Self {
        Self::new(name, ExecutorKind::Deploy(config))
    }

    /// Creates a manual approval gate.
    #[must_use]
    pub fn approval(name: impl Into<String>, config: ApprovalConfig) -> Self {
        Self::new(name, ExecutorKind::ManualApproval(config))
    }

    /// Sets the run order.
    #[must_use]
    pub fn with_run_order(mut self, run_order: u32) -> Self {
        self.run_order = run_order;
        self
    }

    /// Adds an input artifact.
    #[must_use]
    pub fn with_input(mut self, artifact: impl Into<String>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    /// Adds an output artifact.
    #[must_use]
    pub fn with_output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }
}

/// Definition of a stage: an ordered list of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Pipeline-unique stage name.
    pub name: String,
    /// The stage's actions.
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

impl StageDefinition {
    /// Creates an empty stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    /// Appends an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }
}

/// Definition of an entire pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The pipeline name.
    pub name: String,
    /// Stages in execution order.
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
    /// Free-form metadata carried into reports.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PipelineDefinition {
    /// Creates an empty pipeline definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    /// Adds metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Parses a definition from JSON.
    ///
    /// Parsing does not validate; call [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self, ShiplineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a definition from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ShiplineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Serializes the definition as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, ShiplineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the definition and builds its graph.
    pub fn validate(&self) -> Result<PipelineGraph, DefinitionError> {
        PipelineGraph::from_definition(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_action_defaults() {
        let action = ActionDefinition::deploy("Deploy-Test", DeployConfig::new("svc-test"))
            .with_input("image");

        assert_eq!(action.run_order, 1);
        assert_eq!(action.inputs, vec!["image".to_string()]);
        assert!(action.outputs.is_empty());
    }

    #[test]
    fn test_parse_camel_case_fields() {
        let json = r#"{
            "name": "web",
            "stages": [{
                "name": "Deploy-Production",
                "actions": [
                    {"name": "Approve", "executorKind": {"kind": "manual_approval"}, "runOrder": 1},
                    {"name": "Deploy-Prod", "executorKind": {"kind": "deploy", "target": "svc-prod"},
                     "runOrder": 2, "inputs": ["image"]}
                ]
            }]
        }"#;

        let definition = PipelineDefinition::from_json_str(json).unwrap();
        let actions = &definition.stages[0].actions;
        assert_eq!(actions[0].run_order, 1);
        assert_eq!(actions[1].run_order, 2);
        assert!(actions[0].executor.is_approval());
    }

    #[test]
    fn test_run_order_defaults_to_one() {
        let json = r#"{"name": "Fetch", "executor": {"kind": "source", "owner": "o", "repo": "r"}, "outputs": ["src"]}"#;
        let action: ActionDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(action.run_order, 1);
    }

    #[test]
    fn test_json_roundtrip_preserves_definition() {
        let definition = PipelineDefinition::new("web")
            .with_stage(
                StageDefinition::new("Source").with_action(
                    ActionDefinition::source("Fetch", SourceConfig::github("acme", "web"))
                        .with_output("src"),
                ),
            )
            .with_metadata("team", serde_json::json!("platform"));

        let json = definition.to_json_pretty().unwrap();
        assert_eq!(PipelineDefinition::from_json_str(&json).unwrap(), definition);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"name": "empty"}"#).unwrap();

        let definition = PipelineDefinition::from_path(&path).unwrap();
        assert_eq!(definition.name, "empty");
        assert!(definition.stages.is_empty());
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = PipelineDefinition::from_json_str("{").unwrap_err();
        assert!(matches!(err, ShiplineError::Serialization(_)));
    }
}
