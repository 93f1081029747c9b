//! Source revisions and the events that start runs.

use super::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A versioned source change that a run is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRevision {
    /// The commit identifier.
    pub commit: String,
    /// The branch the commit was observed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// The commit message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SourceRevision {
    /// Creates a revision for a commit.
    #[must_use]
    pub fn new(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            branch: None,
            message: None,
        }
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the commit message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for SourceRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch {
            Some(branch) => write!(f, "{}@{}", branch, self.commit),
            None => write!(f, "{}", self.commit),
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// A new source revision was observed.
    SourceRevision,
    /// An operator re-ran an earlier run.
    ManualRerun {
        /// The run being retried.
        previous: RunId,
    },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceRevision => write!(f, "source_revision"),
            Self::ManualRerun { previous } => write!(f, "manual_rerun({previous})"),
        }
    }
}
