//! Approval broker for manual promotion gates.
//!
//! A gate opens a oneshot channel and parks on it; the inbound `decide`
//! channel completes it. Nothing polls: a run waiting for a human costs one
//! map entry and one suspended task.

use crate::cancellation::CancellationToken;
use crate::core::{ActionId, RunId};
use crate::errors::ApprovalError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// The decision a human actor makes at a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Let the gated actions proceed.
    Approve,
    /// Fail the run.
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// An attributed Approve/Reject decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Approve or reject.
    pub verdict: Verdict,
    /// Who decided.
    pub actor: String,
    /// Optional reviewer comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalDecision {
    /// Creates an approval by `actor`.
    #[must_use]
    pub fn approve(actor: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Approve,
            actor: actor.into(),
            comment: None,
        }
    }

    /// Creates a rejection by `actor`.
    #[must_use]
    pub fn reject(actor: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject,
            actor: actor.into(),
            comment: None,
        }
    }

    /// Attaches a comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Returns true for approvals.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.verdict == Verdict::Approve
    }
}

/// Audit record of a decided gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// The gate action name.
    pub gate: String,
    /// The verdict.
    pub verdict: Verdict,
    /// Who decided.
    pub actor: String,
    /// Reviewer comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the gate opened.
    pub requested_at: DateTime<Utc>,
    /// When the decision arrived.
    pub decided_at: DateTime<Utc>,
}

impl ApprovalRecord {
    /// Builds a record from a decision.
    #[must_use]
    pub fn new(gate: impl Into<String>, decision: ApprovalDecision, requested_at: DateTime<Utc>) -> Self {
        Self {
            gate: gate.into(),
            verdict: decision.verdict,
            actor: decision.actor,
            comment: decision.comment,
            requested_at,
            decided_at: Utc::now(),
        }
    }
}

/// A gate asking for a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    /// The waiting run.
    pub run_id: RunId,
    /// The gate action.
    pub gate: ActionId,
    /// The gate action name.
    pub gate_name: String,
    /// Instructions for the approver.
    pub instructions: Option<String>,
    /// Link for the approver to review.
    pub external_link: Option<String>,
}

/// Public view of a gate waiting for a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// The waiting run.
    pub run_id: RunId,
    /// The gate action name.
    pub gate: String,
    /// Instructions for the approver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Link for the approver to review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
    /// When the gate opened.
    pub requested_at: DateTime<Utc>,
}

/// How a gate wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResolution {
    /// A decision arrived.
    Decided(ApprovalDecision),
    /// No decision arrived within the timeout.
    TimedOut(Duration),
    /// The wait was aborted.
    Cancelled(String),
}

#[derive(Debug)]
struct PendingEntry {
    view: PendingApproval,
    response_tx: oneshot::Sender<ApprovalDecision>,
}

/// Routes inbound decisions to the gates waiting for them.
#[derive(Default)]
pub struct ApprovalBroker {
    pending: RwLock<HashMap<(RunId, ActionId), PendingEntry>>,
}

impl ApprovalBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a gate. The gate stays pending until decided, withdrawn, or the
    /// returned [`PendingGate`] is dropped.
    #[must_use]
    pub fn open(self: &Arc<Self>, request: GateRequest) -> PendingGate {
        let (tx, rx) = oneshot::channel();
        let requested_at = Utc::now();
        let key = (request.run_id, request.gate);
        let view = PendingApproval {
            run_id: request.run_id,
            gate: request.gate_name.clone(),
            instructions: request.instructions,
            external_link: request.external_link,
            requested_at,
        };

        debug!(run_id = %request.run_id, gate = %request.gate_name, "Approval gate opened");
        self.pending.write().insert(
            key,
            PendingEntry {
                view,
                response_tx: tx,
            },
        );

        PendingGate {
            broker: Arc::clone(self),
            key,
            gate_name: request.gate_name,
            requested_at,
            rx: Some(rx),
        }
    }

    /// Delivers a decision to a waiting gate.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::NoPendingGate`] if the gate is not waiting
    /// (never opened, already decided, timed out or withdrawn).
    pub fn decide(
        &self,
        run_id: RunId,
        gate: ActionId,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        let no_pending = || ApprovalError::NoPendingGate {
            run_id: run_id.to_string(),
            gate: gate.to_string(),
        };

        let entry = self.pending.write().remove(&(run_id, gate)).ok_or_else(no_pending)?;
        debug!(
            run_id = %run_id,
            gate = %entry.view.gate,
            verdict = %decision.verdict,
            actor = %decision.actor,
            "Approval decision delivered"
        );
        entry.response_tx.send(decision).map_err(|_| no_pending())
    }

    /// Withdraws a pending gate without a decision.
    pub fn withdraw(&self, run_id: RunId, gate: ActionId) -> bool {
        self.pending.write().remove(&(run_id, gate)).is_some()
    }

    /// Withdraws every pending gate of a run.
    pub fn withdraw_run(&self, run_id: RunId) -> usize {
        let mut pending = self.pending.write();
        let before = pending.len();
        pending.retain(|(owner, _), _| *owner != run_id);
        before - pending.len()
    }

    /// Lists all pending gates, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingApproval> {
        let mut views: Vec<PendingApproval> =
            self.pending.read().values().map(|e| e.view.clone()).collect();
        views.sort_by_key(|v| v.requested_at);
        views
    }

    /// Lists the pending gates of one run.
    #[must_use]
    pub fn pending_for(&self, run_id: RunId) -> Vec<PendingApproval> {
        self.pending()
            .into_iter()
            .filter(|v| v.run_id == run_id)
            .collect()
    }

    /// Returns the number of pending gates.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }
}

impl fmt::Debug for ApprovalBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalBroker")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// A gate that has been opened and is waiting for a decision.
///
/// Dropping it withdraws the gate from the broker.
#[derive(Debug)]
pub struct PendingGate {
    broker: Arc<ApprovalBroker>,
    key: (RunId, ActionId),
    gate_name: String,
    requested_at: DateTime<Utc>,
    rx: Option<oneshot::Receiver<ApprovalDecision>>,
}

impl PendingGate {
    /// Returns the gate action name.
    #[must_use]
    pub fn gate_name(&self) -> &str {
        &self.gate_name
    }

    /// Returns when the gate opened.
    #[must_use]
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// Suspends until a decision arrives, the timeout expires, or `cancel`
    /// fires. `None` waits indefinitely.
    pub async fn wait(
        mut self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> GateResolution {
        let Some(mut rx) = self.rx.take() else {
            return GateResolution::Cancelled("approval gate already consumed".to_string());
        };

        let expiry = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            decision = &mut rx => match decision {
                Ok(decision) => GateResolution::Decided(decision),
                Err(_) => GateResolution::Cancelled("approval gate withdrawn".to_string()),
            },
            () = cancel.cancelled() => {
                GateResolution::Cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
            }
            () = expiry => GateResolution::TimedOut(timeout.unwrap_or_default()),
        }
    }
}

impl Drop for PendingGate {
    fn drop(&mut self) {
        if self.broker.withdraw(self.key.0, self.key.1) {
            debug!(run_id = %self.key.0, gate = %self.gate_name, "Approval gate withdrawn");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(run_id: RunId, gate: usize) -> GateRequest {
        GateRequest {
            run_id,
            gate: ActionId::new(gate),
            gate_name: format!("Approve-{gate}"),
            instructions: Some("Check the test deployment".to_string()),
            external_link: None,
        }
    }

    #[tokio::test]
    async fn test_decision_resumes_gate() {
        let broker = Arc::new(ApprovalBroker::new());
        let run_id = RunId::new();
        let gate = broker.open(request(run_id, 1));
        assert_eq!(broker.pending_count(), 1);

        broker
            .decide(run_id, ActionId::new(1), ApprovalDecision::approve("alice"))
            .unwrap();

        let resolution = gate.wait(None, &CancellationToken::new()).await;
        assert_eq!(
            resolution,
            GateResolution::Decided(ApprovalDecision::approve("alice"))
        );
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_decision_from_other_task() {
        let broker = Arc::new(ApprovalBroker::new());
        let run_id = RunId::new();
        let gate = broker.open(request(run_id, 0));

        let decider = {
            let broker = broker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                broker.decide(
                    run_id,
                    ActionId::new(0),
                    ApprovalDecision::reject("bob").with_comment("latency regression"),
                )
            })
        };

        let resolution = gate.wait(None, &CancellationToken::new()).await;
        decider.await.unwrap().unwrap();
        match resolution {
            GateResolution::Decided(decision) => {
                assert!(!decision.is_approved());
                assert_eq!(decision.comment.as_deref(), Some("latency regression"));
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_withdraws_gate() {
        let broker = Arc::new(ApprovalBroker::new());
        let run_id = RunId::new();
        let gate = broker.open(request(run_id, 0));

        let resolution = gate
            .wait(Some(Duration::from_millis(20)), &CancellationToken::new())
            .await;

        assert_eq!(resolution, GateResolution::TimedOut(Duration::from_millis(20)));
        assert_eq!(broker.pending_count(), 0);
        assert!(broker
            .decide(run_id, ActionId::new(0), ApprovalDecision::approve("late"))
            .is_err());
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let broker = Arc::new(ApprovalBroker::new());
        let gate = broker.open(request(RunId::new(), 0));
        let token = CancellationToken::new();
        token.cancel("operator abort");

        let resolution = gate.wait(None, &token).await;
        assert_eq!(resolution, GateResolution::Cancelled("operator abort".to_string()));
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn test_decide_unknown_gate() {
        let broker = ApprovalBroker::new();
        let err = broker
            .decide(RunId::new(), ActionId::new(4), ApprovalDecision::approve("alice"))
            .unwrap_err();
        assert!(matches!(err, ApprovalError::NoPendingGate { .. }));
    }

    #[test]
    fn test_pending_views_per_run() {
        let broker = Arc::new(ApprovalBroker::new());
        let first = RunId::new();
        let second = RunId::new();
        let _a = broker.open(request(first, 0));
        let _b = broker.open(request(second, 0));

        assert_eq!(broker.pending().len(), 2);
        let views = broker.pending_for(first);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].gate, "Approve-0");
        assert_eq!(broker.withdraw_run(second), 1);
        assert_eq!(broker.pending_count(), 1);
    }

    #[test]
    fn test_record_from_decision() {
        let requested_at = Utc::now();
        let record = ApprovalRecord::new(
            "Approve",
            ApprovalDecision::approve("alice").with_comment("lgtm"),
            requested_at,
        );
        assert_eq!(record.verdict, Verdict::Approve);
        assert_eq!(record.actor, "alice");
        assert!(record.decided_at >= record.requested_at);
    }
}
