//! Handle to a started run.

use super::pipeline_engine::EngineInner;
use super::report::RunReport;
use super::state::RunShared;
use crate::approval::ApprovalDecision;
use crate::core::{RunId, RunStatus};
use crate::errors::{ApprovalError, RunError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A run in progress.
///
/// Dropping the handle does not stop the run; it keeps executing and remains
/// addressable through the [`PipelineEngine`](super::PipelineEngine).
#[derive(Debug)]
pub struct RunHandle {
    shared: Arc<RunShared>,
    join: JoinHandle<RunReport>,
    engine: Arc<EngineInner>,
}

impl RunHandle {
    pub(crate) fn new(
        shared: Arc<RunShared>,
        join: JoinHandle<RunReport>,
        engine: Arc<EngineInner>,
    ) -> Self {
        Self {
            shared,
            join,
            engine,
        }
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.shared.run_id
    }

    /// Returns the current run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.shared.status()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.shared.subscribe()
    }

    /// Waits until the run status satisfies `pred` and returns that status.
    ///
    /// Returns the current status if the run ends without ever satisfying it.
    pub async fn wait_for_status(&self, pred: impl Fn(RunStatus) -> bool) -> RunStatus {
        let mut rx = self.shared.subscribe();
        let reached = rx
            .wait_for(|status| pred(*status) || status.is_terminal())
            .await
            .map(|status| *status);
        reached.unwrap_or_else(|_| self.status())
    }

    /// Cancels the run. The run ends Failed with a `cancelled` failure.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NotActive`] if the run already finished.
    pub fn cancel(&self, reason: &str) -> Result<(), RunError> {
        self.engine.cancel(self.shared.run_id, reason)
    }

    /// Delivers an approval decision to one of this run's gates.
    ///
    /// # Errors
    ///
    /// See [`PipelineEngine::decide`](super::PipelineEngine::decide).
    pub fn decide(&self, gate: &str, decision: ApprovalDecision) -> Result<(), ApprovalError> {
        self.engine.decide(self.shared.run_id, gate, decision)
    }

    /// Captures the run's current report.
    #[must_use]
    pub fn snapshot(&self) -> RunReport {
        RunReport::capture(&self.shared)
    }

    /// Waits for the run to finish and returns its final report.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::JoinFailed`] if the run task panicked.
    pub async fn wait(self) -> Result<RunReport, RunError> {
        self.join
            .await
            .map_err(|e| RunError::JoinFailed(e.to_string()))
    }
}
