//! Lifecycle events emitted while a run executes.

use super::{ArtifactRef, RunId, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An event emitted by the engine during a run.
///
/// Events are consumed by [`EventSink`](crate::events::EventSink)s for
/// logging, monitoring, or audit trails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// The event type (e.g., "stage.started", "approval.requested").
    #[serde(rename = "type")]
    pub event_type: String,

    /// The run the event belongs to.
    pub run_id: RunId,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl PipelineEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>, run_id: RunId) -> Self {
        Self {
            event_type: event_type.into(),
            run_id,
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns a data field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Creates a "run.started" event.
    #[must_use]
    pub fn run_started(run_id: RunId, pipeline: &str, revision: &str) -> Self {
        Self::new("run.started", run_id)
            .add_data("pipeline", serde_json::json!(pipeline))
            .add_data("revision", serde_json::json!(revision))
    }

    /// Creates a "run.<status>" event for a status change.
    #[must_use]
    pub fn run_status(run_id: RunId, status: RunStatus) -> Self {
        let event_type = match status {
            RunStatus::Idle => "run.created",
            RunStatus::Running => "run.resumed",
            RunStatus::AwaitingApproval => "run.awaiting_approval",
            RunStatus::Succeeded => "run.succeeded",
            RunStatus::Failed => "run.failed",
        };
        Self::new(event_type, run_id).add_data("status", serde_json::json!(status))
    }

    /// Creates a "stage.<phase>" event.
    #[must_use]
    pub fn stage(run_id: RunId, phase: &str, stage: &str) -> Self {
        Self::new(format!("stage.{phase}"), run_id).add_data("stage", serde_json::json!(stage))
    }

    /// Creates an "action.<phase>" event.
    #[must_use]
    pub fn action(run_id: RunId, phase: &str, stage: &str, action: &str) -> Self {
        Self::new(format!("action.{phase}"), run_id)
            .add_data("stage", serde_json::json!(stage))
            .add_data("action", serde_json::json!(action))
    }

    /// Creates an "artifact.<phase>" event.
    #[must_use]
    pub fn artifact(run_id: RunId, phase: &str, reference: &ArtifactRef) -> Self {
        Self::new(format!("artifact.{phase}"), run_id)
            .add_data("artifact", serde_json::json!(reference.name))
            .add_data("digest", serde_json::json!(reference.digest))
    }
}
