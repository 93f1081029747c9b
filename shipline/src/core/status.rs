//! Action, stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Not yet dispatched.
    Pending,
    /// Dispatched to its executor.
    Running,
    /// The executor reported success.
    Succeeded,
    /// The executor reported failure, the gate was rejected, or the action was aborted.
    Failed,
}

impl Default for ActionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl ActionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet started.
    Pending,
    /// At least one action group has been dispatched.
    Running,
    /// Every action succeeded.
    Succeeded,
    /// At least one action failed.
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created but not yet started.
    Idle,
    /// Stages are executing.
    Running,
    /// The active stage is parked on at least one approval gate.
    AwaitingApproval,
    /// Every stage succeeded.
    Succeeded,
    /// A stage failed, a gate was rejected, or the run was cancelled.
    Failed,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::AwaitingApproval => write!(f, "awaiting_approval"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl RunStatus {
    /// Returns true if the run can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the run is executing, including while parked on a gate.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::AwaitingApproval)
    }

    /// Returns whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::AwaitingApproval)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::AwaitingApproval, Self::Running)
                | (Self::AwaitingApproval, Self::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::AwaitingApproval.to_string(), "awaiting_approval");
        assert_eq!(ActionStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StageStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_run_status_transitions() {
        assert!(RunStatus::Idle.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::AwaitingApproval));
        assert!(RunStatus::AwaitingApproval.can_transition_to(RunStatus::Running));
        assert!(RunStatus::AwaitingApproval.can_transition_to(RunStatus::Failed));

        assert!(!RunStatus::Idle.can_transition_to(RunStatus::Succeeded));
        assert!(!RunStatus::AwaitingApproval.can_transition_to(RunStatus::Succeeded));
    }

    #[test]
    fn test_terminal_runs_never_reenter_running() {
        for terminal in [RunStatus::Succeeded, RunStatus::Failed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(RunStatus::Running));
            assert!(!terminal.can_transition_to(RunStatus::AwaitingApproval));
        }
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&RunStatus::AwaitingApproval).unwrap();
        assert_eq!(json, r#""awaiting_approval""#);

        let status: ActionStatus = serde_json::from_str(r#""running""#).unwrap();
        assert_eq!(status, ActionStatus::Running);
    }
}
