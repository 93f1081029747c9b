//! Validated, integer-indexed pipeline graph.
//!
//! Stages, actions and artifacts become nodes addressed by dense ids.
//! Artifact wiring is resolved once here; the engine never looks anything up
//! by name while a run executes.

use super::{ExecutorKind, PipelineDefinition};
use crate::core::{ActionId, ArtifactId, StageId};
use crate::errors::DefinitionError;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[A-Za-z0-9.@_-]{1,100}$").unwrap()
    })
}

fn check_name(element: &'static str, name: &str) -> Result<(), DefinitionError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(DefinitionError::InvalidName {
            element,
            name: name.to_string(),
        })
    }
}

/// An action node.
#[derive(Debug, Clone)]
pub struct ActionNode {
    /// Pipeline-wide action id.
    pub id: ActionId,
    /// Enclosing stage.
    pub stage: StageId,
    /// Action name.
    pub name: String,
    /// Executor kind and configuration.
    pub executor: ExecutorKind,
    /// Intra-stage ordering group.
    pub run_order: u32,
    /// Consumed artifacts, in declaration order.
    pub inputs: Vec<ArtifactId>,
    /// Produced artifacts, in declaration order.
    pub outputs: Vec<ArtifactId>,
}

/// Actions of one stage that share a run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOrderGroup {
    /// The shared run order.
    pub run_order: u32,
    /// Actions in the group, in declaration order.
    pub actions: Vec<ActionId>,
}

/// A stage node.
#[derive(Debug, Clone)]
pub struct StageNode {
    /// Stage id (declaration index).
    pub id: StageId,
    /// Stage name.
    pub name: String,
    /// All actions, in declaration order.
    pub actions: Vec<ActionId>,
    /// Actions partitioned by ascending run order.
    pub groups: Vec<RunOrderGroup>,
}

/// An artifact node: one producer, any number of consumers.
#[derive(Debug, Clone)]
pub struct ArtifactNode {
    /// Artifact id.
    pub id: ArtifactId,
    /// Declared name.
    pub name: String,
    /// The single producing action.
    pub producer: ActionId,
    /// Consuming actions, in declaration order.
    pub consumers: Vec<ActionId>,
}

/// A pipeline definition that passed validation.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    definition: PipelineDefinition,
    stages: Vec<StageNode>,
    actions: Vec<ActionNode>,
    artifacts: Vec<ArtifactNode>,
    action_index: HashMap<String, ActionId>,
    artifact_index: HashMap<String, ArtifactId>,
}

impl PipelineGraph {
    /// Validates a definition and builds its graph.
    ///
    /// # Errors
    ///
    /// Returns the first [`DefinitionError`] found. Nothing about a rejected
    /// definition can ever run.
    pub fn from_definition(definition: PipelineDefinition) -> Result<Self, DefinitionError> {
        if definition.name.trim().is_empty() {
            return Err(DefinitionError::EmptyPipelineName);
        }
        check_name("pipeline", &definition.name)?;
        if definition.stages.is_empty() {
            return Err(DefinitionError::EmptyPipeline {
                pipeline: definition.name.clone(),
            });
        }

        let mut stages = Vec::with_capacity(definition.stages.len());
        let mut actions: Vec<ActionNode> = Vec::new();
        let mut stage_names = HashSet::new();
        let mut action_index = HashMap::new();

        for (stage_idx, stage_def) in definition.stages.iter().enumerate() {
            check_name("stage", &stage_def.name)?;
            if !stage_names.insert(stage_def.name.as_str()) {
                return Err(DefinitionError::DuplicateStage {
                    stage: stage_def.name.clone(),
                });
            }
            if stage_def.actions.is_empty() {
                return Err(DefinitionError::EmptyStage {
                    stage: stage_def.name.clone(),
                });
            }

            let stage_id = StageId::new(stage_idx);
            let mut stage_actions = Vec::with_capacity(stage_def.actions.len());
            let mut groups: BTreeMap<u32, Vec<ActionId>> = BTreeMap::new();

            for action_def in &stage_def.actions {
                check_name("action", &action_def.name)?;
                if action_index.contains_key(&action_def.name) {
                    return Err(DefinitionError::DuplicateAction {
                        action: action_def.name.clone(),
                    });
                }
                if action_def.run_order == 0 {
                    return Err(DefinitionError::InvalidRunOrder {
                        action: action_def.name.clone(),
                    });
                }
                check_arity(action_def.name.as_str(), &action_def.executor, action_def.inputs.len(), action_def.outputs.len())?;

                let id = ActionId::new(actions.len());
                action_index.insert(action_def.name.clone(), id);
                stage_actions.push(id);
                groups.entry(action_def.run_order).or_default().push(id);
                actions.push(ActionNode {
                    id,
                    stage: stage_id,
                    name: action_def.name.clone(),
                    executor: action_def.executor.clone(),
                    run_order: action_def.run_order,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                });
            }

            stages.push(StageNode {
                id: stage_id,
                name: stage_def.name.clone(),
                actions: stage_actions,
                groups: groups
                    .into_iter()
                    .map(|(run_order, actions)| RunOrderGroup { run_order, actions })
                    .collect(),
            });
        }

        let action_defs: Vec<_> = definition.stages.iter().flat_map(|s| s.actions.iter()).collect();

        // Producers first, so inputs can reference any declared artifact.
        let mut artifacts: Vec<ArtifactNode> = Vec::new();
        let mut artifact_index: HashMap<String, ArtifactId> = HashMap::new();
        for (action, action_def) in actions.iter_mut().zip(&action_defs) {
            for output in &action_def.outputs {
                check_name("artifact", output)?;
                if let Some(existing) = artifact_index.get(output) {
                    let first = artifacts[existing.index()].producer;
                    return Err(DefinitionError::DuplicateArtifactProducer {
                        artifact: output.clone(),
                        first: action_defs[first.index()].name.clone(),
                        second: action.name.clone(),
                    });
                }
                let id = ArtifactId::new(artifacts.len());
                artifact_index.insert(output.clone(), id);
                artifacts.push(ArtifactNode {
                    id,
                    name: output.clone(),
                    producer: action.id,
                    consumers: Vec::new(),
                });
                action.outputs.push(id);
            }
        }

        for (consumer_idx, action_def) in action_defs.iter().enumerate() {
            for input in &action_def.inputs {
                let Some(&artifact_id) = artifact_index.get(input) else {
                    return Err(DefinitionError::ArtifactNotFound {
                        artifact: input.clone(),
                        consumer: action_def.name.clone(),
                    });
                };
                let producer = artifacts[artifact_id.index()].producer;
                let consumer = &actions[consumer_idx];

                if producer == consumer.id {
                    return Err(DefinitionError::CycleDetected {
                        path: vec![consumer.name.clone(), input.clone(), consumer.name.clone()],
                    });
                }
                let producer_node = &actions[producer.index()];
                let runs_before = producer_node.stage < consumer.stage
                    || (producer_node.stage == consumer.stage
                        && producer_node.run_order < consumer.run_order);
                if !runs_before {
                    return Err(DefinitionError::ArtifactUnavailable {
                        artifact: input.clone(),
                        consumer: consumer.name.clone(),
                        producer: producer_node.name.clone(),
                    });
                }

                artifacts[artifact_id.index()].consumers.push(consumer.id);
                actions[consumer_idx].inputs.push(artifact_id);
            }
        }

        Ok(Self {
            definition,
            stages,
            actions,
            artifacts,
            action_index,
            artifact_index,
        })
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Returns the source definition.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Returns all stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageNode] {
        &self.stages
    }

    /// Returns all actions, indexed by [`ActionId`].
    #[must_use]
    pub fn actions(&self) -> &[ActionNode] {
        &self.actions
    }

    /// Returns all artifacts, indexed by [`ArtifactId`].
    #[must_use]
    pub fn artifacts(&self) -> &[ArtifactNode] {
        &self.artifacts
    }

    /// Returns a stage by id.
    #[must_use]
    pub fn stage(&self, id: StageId) -> &StageNode {
        &self.stages[id.index()]
    }

    /// Returns an action by id.
    #[must_use]
    pub fn action(&self, id: ActionId) -> &ActionNode {
        &self.actions[id.index()]
    }

    /// Returns an artifact by id.
    #[must_use]
    pub fn artifact(&self, id: ArtifactId) -> &ArtifactNode {
        &self.artifacts[id.index()]
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn find_action(&self, name: &str) -> Option<&ActionNode> {
        self.action_index.get(name).map(|id| self.action(*id))
    }

    /// Looks up an artifact by name.
    #[must_use]
    pub fn find_artifact(&self, name: &str) -> Option<&ArtifactNode> {
        self.artifact_index.get(name).map(|id| self.artifact(*id))
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn find_stage(&self, name: &str) -> Option<&StageNode> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the artifacts produced by a stage, in declaration order.
    #[must_use]
    pub fn stage_outputs(&self, id: StageId) -> Vec<ArtifactId> {
        self.stage(id)
            .actions
            .iter()
            .flat_map(|a| self.action(*a).outputs.iter().copied())
            .collect()
    }

    /// Returns all approval gates.
    #[must_use]
    pub fn approval_gates(&self) -> Vec<&ActionNode> {
        self.actions.iter().filter(|a| a.executor.is_approval()).collect()
    }
}

fn check_arity(
    action: &str,
    executor: &ExecutorKind,
    inputs: usize,
    outputs: usize,
) -> Result<(), DefinitionError> {
    let input_arity = executor.input_arity();
    if !input_arity.contains(&inputs) {
        return Err(DefinitionError::InvalidArity {
            action: action.to_string(),
            kind: executor.label(),
            detail: describe_arity("input", &input_arity, inputs),
        });
    }
    let output_arity = executor.output_arity();
    if !output_arity.contains(&outputs) {
        return Err(DefinitionError::InvalidArity {
            action: action.to_string(),
            kind: executor.label(),
            detail: describe_arity("output", &output_arity, outputs),
        });
    }
    Ok(())
}

fn describe_arity(what: &str, allowed: &std::ops::RangeInclusive<usize>, actual: usize) -> String {
    if allowed.start() == allowed.end() {
        format!("takes exactly {} {what} artifact(s), got {actual}", allowed.start())
    } else {
        format!(
            "takes {}..={} {what} artifact(s), got {actual}",
            allowed.start(),
            allowed.end()
        )
    }
}
