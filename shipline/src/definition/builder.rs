//! Pipeline builder with incremental validation.

use super::{PipelineDefinition, PipelineGraph, StageDefinition};
use crate::errors::DefinitionError;

/// Builder for creating validated pipelines stage by stage.
///
/// Every added stage is checked against the stages before it, so a wiring
/// mistake is reported at the stage that introduced it.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    definition: PipelineDefinition,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: PipelineDefinition::new(name),
        }
    }

    /// Adds a stage to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline up to and including this stage is
    /// invalid (duplicate names, unknown or late artifacts, bad arity).
    pub fn stage(mut self, stage: StageDefinition) -> Result<Self, DefinitionError> {
        self.definition.stages.push(stage);
        PipelineGraph::from_definition(self.definition.clone())?;
        Ok(self)
    }

    /// Adds pipeline metadata.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.definition.metadata.insert(key.into(), value);
        self
    }

    /// Builds the pipeline graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages.
    pub fn build(self) -> Result<PipelineGraph, DefinitionError> {
        PipelineGraph::from_definition(self.definition)
    }

    /// Returns the definition assembled so far.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.definition.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ActionDefinition, BuildConfig, DeployConfig, SourceConfig};

    fn source() -> StageDefinition {
        StageDefinition::new("Source").with_action(
            ActionDefinition::source("Fetch", SourceConfig::github("acme", "web")).with_output("src"),
        )
    }

    #[test]
    fn test_builder_basic() {
        let graph = PipelineBuilder::new("web")
            .stage(source())
            .unwrap()
            .stage(StageDefinition::new("Build").with_action(
                ActionDefinition::build("Compile", BuildConfig::new("b.yml")).with_input("src"),
            ))
            .unwrap()
            .metadata("owner", serde_json::json!("platform"))
            .build()
            .unwrap();

        assert_eq!(graph.name(), "web");
        assert_eq!(graph.stages().len(), 2);
        assert_eq!(graph.definition().metadata.len(), 1);
    }

    #[test]
    fn test_builder_rejects_at_offending_stage() {
        let builder = PipelineBuilder::new("web").stage(source()).unwrap();

        let err = builder
            .clone()
            .stage(StageDefinition::new("Deploy").with_action(
                ActionDefinition::deploy("Ship", DeployConfig::new("svc")).with_input("image"),
            ))
            .unwrap_err();

        assert_eq!(err.code(), "DEF-002-ARTIFACT_NOT_FOUND");
        assert_eq!(builder.stage_count(), 1);
    }

    #[test]
    fn test_empty_builder_fails() {
        let err = PipelineBuilder::new("web").build().unwrap_err();
        assert_eq!(err.code(), "DEF-001-EMPTY");
    }
}
