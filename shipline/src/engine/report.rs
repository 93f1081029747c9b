//! Run reports.

use super::state::{FailureInfo, RunShared};
use crate::approval::ApprovalRecord;
use crate::core::{ActionStatus, ArtifactRef, RunId, RunStatus, SourceRevision, StageStatus, Trigger};
use crate::utils::{duration_ms, Timestamp};
use serde::{Deserialize, Serialize};

/// Status of one action in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    /// Action name.
    pub name: String,
    /// Executor kind label.
    pub kind: String,
    /// Run order group.
    pub run_order: u32,
    /// Final (or current) status.
    pub status: ActionStatus,
    /// Failure reason, if the action failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status of one stage in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Final (or current) status.
    pub status: StageStatus,
    /// Actions in declaration order.
    pub actions: Vec<ActionReport>,
}

/// Snapshot of a run, final once the run is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// The run.
    pub run_id: RunId,
    /// The pipeline name.
    pub pipeline: String,
    /// What started the run.
    pub trigger: Trigger,
    /// The revision the run is bound to.
    pub revision: SourceRevision,
    /// Overall status.
    pub status: RunStatus,
    /// The stage currently (or last) executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    /// Per-stage status in declaration order.
    pub stages: Vec<StageReport>,
    /// Artifacts produced and retained.
    pub artifacts: Vec<ArtifactRef>,
    /// Artifacts whose put completed after the run was cancelled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphaned_artifacts: Vec<ArtifactRef>,
    /// Artifacts released from the store after the run failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub released_artifacts: Vec<ArtifactRef>,
    /// Decided approval gates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvals: Vec<ApprovalRecord>,
    /// Failure details for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    /// Wall time in milliseconds, once finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

impl RunReport {
    pub(crate) fn capture(shared: &RunShared) -> Self {
        let graph = &shared.graph;
        shared.read(|state| Self {
            run_id: shared.run_id,
            pipeline: graph.name().to_string(),
            trigger: shared.trigger.clone(),
            revision: shared.revision.clone(),
            status: state.status,
            current_stage: state.current_stage.map(|id| graph.stage(id).name.clone()),
            stages: graph
                .stages()
                .iter()
                .map(|stage| StageReport {
                    name: stage.name.clone(),
                    status: state.stage_status[stage.id.index()],
                    actions: stage
                        .actions
                        .iter()
                        .map(|id| {
                            let action = graph.action(*id);
                            ActionReport {
                                name: action.name.clone(),
                                kind: action.executor.label().to_string(),
                                run_order: action.run_order,
                                status: state.action_status[id.index()],
                                error: state.action_errors[id.index()].clone(),
                            }
                        })
                        .collect(),
                })
                .collect(),
            artifacts: state.artifacts.values().cloned().collect(),
            orphaned_artifacts: state.orphaned.clone(),
            released_artifacts: state.released.clone(),
            approvals: state.approvals.clone(),
            failure: state.failure.clone(),
            started_at: state.started_at,
            finished_at: state.finished_at,
            duration_ms: state.finished_at.map(|end| duration_ms(state.started_at, end)),
        })
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Returns the name of the failing stage.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.stage.as_str())
    }

    /// Returns the failure reason.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.reason.as_str())
    }

    /// Looks up a retained artifact by name.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&ArtifactRef> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Looks up a stage status by name.
    #[must_use]
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.stages.iter().find(|s| s.name == name).map(|s| s.status)
    }

    /// Looks up an action status by name.
    #[must_use]
    pub fn action_status(&self, name: &str) -> Option<ActionStatus> {
        self.stages
            .iter()
            .flat_map(|s| s.actions.iter())
            .find(|a| a.name == name)
            .map(|a| a.status)
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoOpEventSink;
    use crate::executors::FailureKind;
    use crate::testing::delivery_pipeline;
    use std::sync::Arc;

    #[test]
    fn test_capture_fresh_run() {
        let graph = Arc::new(delivery_pipeline().validate().unwrap());
        let shared = RunShared::new(
            graph,
            SourceRevision::new("abc123"),
            Trigger::SourceRevision,
            Arc::new(NoOpEventSink),
        );

        let report = RunReport::capture(&shared);
        assert_eq!(report.status, RunStatus::Idle);
        assert_eq!(report.stages.len(), 6);
        assert_eq!(report.action_status("Deploy-Prod"), Some(ActionStatus::Pending));
        assert!(report.duration_ms.is_none());
        assert!(report.failed_stage().is_none());
    }

    #[test]
    fn test_report_serializes() {
        let graph = Arc::new(delivery_pipeline().validate().unwrap());
        let shared = RunShared::new(
            graph,
            SourceRevision::new("abc123").with_branch("main"),
            Trigger::SourceRevision,
            Arc::new(NoOpEventSink),
        );
        shared.update(|s| {
            s.failure = Some(FailureInfo {
                stage: "Test".to_string(),
                action: Some("Unit-Test".to_string()),
                reason: "3 tests failed".to_string(),
                kind: FailureKind::Executor,
            });
        });

        let report = RunReport::capture(&shared);
        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["failure"]["kind"], serde_json::json!("executor"));
        assert_eq!(json["revision"]["branch"], serde_json::json!("main"));
        assert_eq!(report.failure_reason(), Some("3 tests failed"));
    }
}
