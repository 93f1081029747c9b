//! Run state machine and the state shared by a run's tasks.

use crate::approval::{ApprovalRecord, Verdict};
use crate::cancellation::CancellationToken;
use crate::core::{
    ActionId, ActionStatus, ArtifactId, ArtifactRef, PipelineEvent, RunId, RunStatus,
    SourceRevision, StageId, StageStatus, Trigger,
};
use crate::definition::{ActionNode, PipelineGraph};
use crate::errors::RunError;
use crate::events::EventSink;
use crate::executors::{FailureKind, GateListener};
use crate::utils::{now_utc, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Where and why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// The failing stage.
    pub stage: String,
    /// The failing action. `None` when the run was cancelled between actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// The raw failure reason.
    pub reason: String,
    /// Failure category.
    pub kind: FailureKind,
}

/// Mutable state of one run.
#[derive(Debug, Clone)]
pub(crate) struct RunState {
    pub status: RunStatus,
    pub current_stage: Option<StageId>,
    pub stage_status: Vec<StageStatus>,
    pub action_status: Vec<ActionStatus>,
    pub action_errors: Vec<Option<String>>,
    pub artifacts: BTreeMap<ArtifactId, ArtifactRef>,
    pub orphaned: Vec<ArtifactRef>,
    pub released: Vec<ArtifactRef>,
    pub approvals: Vec<ApprovalRecord>,
    pub failure: Option<FailureInfo>,
    pub open_gates: usize,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
}

impl RunState {
    pub fn new(graph: &PipelineGraph) -> Self {
        Self {
            status: RunStatus::Idle,
            current_stage: None,
            stage_status: vec![StageStatus::Pending; graph.stages().len()],
            action_status: vec![ActionStatus::Pending; graph.actions().len()],
            action_errors: vec![None; graph.actions().len()],
            artifacts: BTreeMap::new(),
            orphaned: Vec::new(),
            released: Vec::new(),
            approvals: Vec::new(),
            failure: None,
            open_gates: 0,
            started_at: now_utc(),
            finished_at: None,
        }
    }

    /// Moves the run to `to`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, to: RunStatus) -> Result<(), RunError> {
        if !self.status.can_transition_to(to) {
            return Err(RunError::IllegalTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// State shared between a run's driver, its action tasks and its handle.
pub(crate) struct RunShared {
    pub run_id: RunId,
    pub graph: Arc<PipelineGraph>,
    pub revision: SourceRevision,
    pub trigger: Trigger,
    pub cancel: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
    state: RwLock<RunState>,
    status_tx: watch::Sender<RunStatus>,
}

impl RunShared {
    pub fn new(
        graph: Arc<PipelineGraph>,
        revision: SourceRevision,
        trigger: Trigger,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let state = RunState::new(&graph);
        let (status_tx, _) = watch::channel(state.status);
        Self {
            run_id: RunId::new(),
            graph,
            revision,
            trigger,
            cancel: Arc::new(CancellationToken::new()),
            events,
            state: RwLock::new(state),
            status_tx,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.state.read().status
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        f(&self.state.read())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> R {
        f(&mut self.state.write())
    }

    pub async fn emit(&self, event: PipelineEvent) {
        self.events.emit(&event).await;
    }

    /// Idle to Running. Emits `run.started`.
    pub async fn start(&self) -> Result<(), RunError> {
        self.update(|s| s.transition(RunStatus::Running))?;
        self.status_tx.send_replace(RunStatus::Running);
        self.emit(PipelineEvent::run_started(
            self.run_id,
            self.graph.name(),
            &self.revision.to_string(),
        ))
        .await;
        Ok(())
    }

    /// Applies a status transition and publishes it.
    pub fn transition(&self, to: RunStatus) -> Result<(), RunError> {
        self.update(|s| s.transition(to))?;
        self.publish(to);
        Ok(())
    }

    fn publish(&self, status: RunStatus) {
        self.status_tx.send_replace(status);
        self.events.try_emit(&PipelineEvent::run_status(self.run_id, status));
    }

    pub fn set_stage(&self, stage: StageId, status: StageStatus) {
        self.update(|s| {
            s.stage_status[stage.index()] = status;
            if status == StageStatus::Running {
                s.current_stage = Some(stage);
            }
        });
    }

    pub fn set_action(&self, action: ActionId, status: ActionStatus, error: Option<String>) {
        self.update(|s| {
            s.action_status[action.index()] = status;
            s.action_errors[action.index()] = error;
        });
    }

    /// Records a stored artifact. Returns true if it landed after cancellation.
    pub fn record_artifact(&self, reference: ArtifactRef) -> bool {
        let orphaned = self.cancel.is_cancelled();
        self.update(|s| {
            if orphaned {
                s.orphaned.push(reference);
            } else {
                s.artifacts.insert(reference.artifact, reference);
            }
        });
        orphaned
    }
}

impl std::fmt::Debug for RunShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunShared")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.graph.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl GateListener for RunShared {
    fn gate_opened(&self, gate: &ActionNode) {
        let parked = self.update(|s| {
            s.open_gates += 1;
            s.status == RunStatus::Running && s.transition(RunStatus::AwaitingApproval).is_ok()
        });

        self.events.try_emit(
            &PipelineEvent::new("approval.requested", self.run_id)
                .add_data("gate", serde_json::json!(gate.name)),
        );
        if parked {
            info!(run_id = %self.run_id, gate = %gate.name, "Run awaiting approval");
            self.publish(RunStatus::AwaitingApproval);
        }
    }

    fn gate_closed(&self, gate: &ActionNode, record: Option<&ApprovalRecord>) {
        let approved = record.is_some_and(|r| r.verdict == Verdict::Approve);
        let resumed = self.update(|s| {
            s.open_gates = s.open_gates.saturating_sub(1);
            approved
                && s.open_gates == 0
                && s.status == RunStatus::AwaitingApproval
                && s.transition(RunStatus::Running).is_ok()
        });

        match record {
            Some(record) => self.events.try_emit(
                &PipelineEvent::new("approval.decided", self.run_id)
                    .add_data("gate", serde_json::json!(gate.name))
                    .add_data("verdict", serde_json::json!(record.verdict))
                    .add_data("actor", serde_json::json!(record.actor)),
            ),
            None => warn!(run_id = %self.run_id, gate = %gate.name, "Approval gate closed without a decision"),
        }
        if resumed {
            info!(run_id = %self.run_id, gate = %gate.name, "Run resumed after approval");
            self.publish(RunStatus::Running);
        }
    }
}
