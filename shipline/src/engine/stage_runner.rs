//! Executes one stage, group by group in ascending run order.

use super::pipeline_engine::EngineInner;
use super::state::{FailureInfo, RunShared};
use crate::cancellation::CancellationToken;
use crate::core::{ActionId, ActionStatus, ArtifactKey, PipelineEvent};
use crate::definition::{RunOrderGroup, StageNode};
use crate::executors::{ActionContext, ActionOutcome, FailureKind};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of running one stage.
#[derive(Debug)]
pub(crate) enum StageResult {
    Succeeded,
    Failed(FailureInfo),
}

pub(crate) struct StageRunner<'a> {
    inner: &'a Arc<EngineInner>,
    shared: &'a Arc<RunShared>,
}

impl<'a> StageRunner<'a> {
    pub fn new(inner: &'a Arc<EngineInner>, shared: &'a Arc<RunShared>) -> Self {
        Self { inner, shared }
    }

    /// Runs every group of the stage. A failing group stops the stage; later
    /// groups are never dispatched.
    pub async fn run(&self, stage: &StageNode) -> StageResult {
        for group in &stage.groups {
            if let Some(reason) = self.shared.cancel.reason() {
                return StageResult::Failed(FailureInfo {
                    stage: stage.name.clone(),
                    action: None,
                    reason,
                    kind: FailureKind::Cancelled,
                });
            }

            debug!(
                run_id = %self.shared.run_id,
                stage = %stage.name,
                run_order = group.run_order,
                actions = group.actions.len(),
                "Dispatching run order group"
            );
            if let Some(failure) = self.run_group(stage, group).await {
                return StageResult::Failed(failure);
            }
        }
        StageResult::Succeeded
    }

    async fn run_group(&self, stage: &StageNode, group: &RunOrderGroup) -> Option<FailureInfo> {
        let graph = &self.shared.graph;
        let group_token = self.shared.cancel.child();
        let mut in_flight = FuturesUnordered::new();

        for &action_id in &group.actions {
            let action = graph.action(action_id);
            self.shared.set_action(action_id, ActionStatus::Running, None);
            info!(
                run_id = %self.shared.run_id,
                stage = %stage.name,
                action = %action.name,
                run_order = group.run_order,
                "Action started"
            );
            self.shared
                .emit(
                    PipelineEvent::action(self.shared.run_id, "started", &stage.name, &action.name)
                        .add_data("run_order", serde_json::json!(group.run_order)),
                )
                .await;

            let handle = tokio::spawn(execute_action(
                Arc::clone(self.inner),
                Arc::clone(self.shared),
                action_id,
                Arc::clone(&group_token),
            ));
            in_flight.push(async move { (action_id, handle.await) });
        }

        let mut failure: Option<FailureInfo> = None;
        while let Some((action_id, joined)) = in_flight.next().await {
            let outcome = joined.unwrap_or_else(|e| {
                ActionOutcome::failed(FailureKind::Internal, format!("action task failed: {e}"))
            });

            if let Some(action_failure) = self.settle(stage, action_id, outcome).await {
                if failure.is_none() {
                    group_token.cancel(format!(
                        "action '{}' failed in the same run order group",
                        graph.action(action_id).name
                    ));
                    failure = Some(action_failure);
                }
            }
        }
        failure
    }

    /// Records an action's outcome, storing its outputs on success.
    async fn settle(
        &self,
        stage: &StageNode,
        action_id: ActionId,
        outcome: ActionOutcome,
    ) -> Option<FailureInfo> {
        let graph = &self.shared.graph;
        let action = graph.action(action_id);
        let run_id = self.shared.run_id;

        match outcome {
            ActionOutcome::Succeeded { outputs, approval } => {
                if let Some(record) = approval {
                    self.shared.update(|s| s.approvals.push(record));
                }

                for (artifact_id, payload) in outputs {
                    let node = graph.artifact(artifact_id);
                    let key = ArtifactKey::new(run_id, artifact_id, &node.name, action_id);
                    match self.inner.store.put(key, payload).await {
                        Ok(reference) => {
                            let phase = if self.shared.record_artifact(reference.clone()) {
                                warn!(run_id = %run_id, artifact = %reference, "Artifact stored after cancellation");
                                "orphaned"
                            } else {
                                "stored"
                            };
                            self.shared
                                .emit(PipelineEvent::artifact(run_id, phase, &reference))
                                .await;
                        }
                        Err(e) => {
                            return Some(
                                self.fail_action(stage, action_id, FailureKind::Internal, e.to_string())
                                    .await,
                            );
                        }
                    }
                }

                self.shared.set_action(action_id, ActionStatus::Succeeded, None);
                info!(run_id = %run_id, stage = %stage.name, action = %action.name, "Action succeeded");
                self.shared
                    .emit(PipelineEvent::action(run_id, "succeeded", &stage.name, &action.name))
                    .await;
                None
            }
            ActionOutcome::Failed {
                kind,
                reason,
                approval,
            } => {
                if let Some(record) = approval {
                    self.shared.update(|s| s.approvals.push(record));
                }
                Some(self.fail_action(stage, action_id, kind, reason).await)
            }
        }
    }

    async fn fail_action(
        &self,
        stage: &StageNode,
        action_id: ActionId,
        kind: FailureKind,
        reason: String,
    ) -> FailureInfo {
        let action = self.shared.graph.action(action_id);
        self.shared
            .set_action(action_id, ActionStatus::Failed, Some(reason.clone()));
        warn!(
            run_id = %self.shared.run_id,
            stage = %stage.name,
            action = %action.name,
            kind = %kind,
            reason = %reason,
            "Action failed"
        );
        self.shared
            .emit(
                PipelineEvent::action(self.shared.run_id, "failed", &stage.name, &action.name)
                    .add_data("kind", serde_json::json!(kind))
                    .add_data("reason", serde_json::json!(reason)),
            )
            .await;

        FailureInfo {
            stage: stage.name.clone(),
            action: Some(action.name.clone()),
            reason,
            kind,
        }
    }
}

/// Resolves an action's inputs and runs it to a terminal outcome.
///
/// External executors are raced against the group token and dropped when it
/// fires. Approval gates observe the token themselves so the gate is always
/// closed through the listener.
async fn execute_action(
    inner: Arc<EngineInner>,
    shared: Arc<RunShared>,
    action_id: ActionId,
    cancel: Arc<CancellationToken>,
) -> ActionOutcome {
    let graph = Arc::clone(&shared.graph);
    let action = graph.action(action_id);
    let stage = graph.stage(action.stage);

    let mut inputs = Vec::with_capacity(action.inputs.len());
    for artifact_id in &action.inputs {
        let reference = shared.read(|s| s.artifacts.get(artifact_id).cloned());
        let Some(reference) = reference else {
            return ActionOutcome::failed(
                FailureKind::Internal,
                format!("artifact '{}' was not produced", graph.artifact(*artifact_id).name),
            );
        };
        match inner.store.get(&reference).await {
            Ok(artifact) => inputs.push(artifact),
            Err(e) => return ActionOutcome::failed(FailureKind::Internal, e.to_string()),
        }
    }

    let ctx = ActionContext {
        run_id: shared.run_id,
        pipeline: graph.name(),
        stage: &stage.name,
        revision: &shared.revision,
        action,
        inputs,
        cancel: cancel.as_ref(),
        listener: shared.as_ref(),
    };

    if action.executor.is_approval() {
        return inner.dispatcher.execute(&ctx).await;
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => ActionOutcome::failed(
            FailureKind::Cancelled,
            cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
        ),
        outcome = inner.dispatcher.execute(&ctx) => outcome,
    }
}
