//! Error types for the shipline engine.
//!
//! Definition problems are caught when a pipeline is loaded and never start a
//! run. Executor failures are not errors at all: they are recorded in the
//! [`RunReport`](crate::engine::RunReport) of a failed run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for shipline operations.
#[derive(Debug, Error)]
pub enum ShiplineError {
    /// The pipeline definition is invalid.
    #[error("{0}")]
    Definition(#[from] DefinitionError),

    /// The artifact store rejected an operation.
    #[error("{0}")]
    ArtifactStore(#[from] ArtifactStoreError),

    /// An approval decision could not be delivered.
    #[error("{0}")]
    Approval(#[from] ApprovalError),

    /// A run-level error.
    #[error("{0}")]
    Run(#[from] RunError),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Diagnostic summary of an error, suitable for API responses and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g. "DEF-002-DUPLICATE_PRODUCER").
    pub code: String,
    /// Human readable summary.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

/// Errors detected while validating a pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// The pipeline name is empty or whitespace-only.
    #[error("Pipeline name cannot be empty or whitespace-only")]
    EmptyPipelineName,

    /// The pipeline has no stages.
    #[error("Pipeline '{pipeline}' has no stages")]
    EmptyPipeline {
        /// The pipeline name.
        pipeline: String,
    },

    /// A stage has no actions.
    #[error("Stage '{stage}' has no actions")]
    EmptyStage {
        /// The stage name.
        stage: String,
    },

    /// A name does not match the allowed character set.
    #[error("Invalid {element} name '{name}': expected 1-100 characters from [A-Za-z0-9.@_-]")]
    InvalidName {
        /// What the name belongs to ("stage", "action", "artifact", "pipeline").
        element: &'static str,
        /// The offending name.
        name: String,
    },

    /// Two stages share a name.
    #[error("Duplicate stage name '{stage}'")]
    DuplicateStage {
        /// The stage name.
        stage: String,
    },

    /// Two actions share a name.
    #[error("Duplicate action name '{action}'")]
    DuplicateAction {
        /// The action name.
        action: String,
    },

    /// An action declares `run_order = 0`.
    #[error("Action '{action}' has run order 0; run orders start at 1")]
    InvalidRunOrder {
        /// The action name.
        action: String,
    },

    /// An action declares the wrong number of inputs or outputs for its executor.
    #[error("Action '{action}' ({kind}) {detail}")]
    InvalidArity {
        /// The action name.
        action: String,
        /// The executor kind label.
        kind: &'static str,
        /// What is wrong.
        detail: String,
    },

    /// Two actions declare the same output artifact.
    #[error("Artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    DuplicateArtifactProducer {
        /// The artifact name.
        artifact: String,
        /// The first declared producer.
        first: String,
        /// The conflicting producer.
        second: String,
    },

    /// An action consumes an artifact that no action produces.
    #[error("Action '{consumer}' consumes artifact '{artifact}' which is never produced")]
    ArtifactNotFound {
        /// The artifact name.
        artifact: String,
        /// The consuming action.
        consumer: String,
    },

    /// An action consumes an artifact that is not produced strictly before it.
    #[error("Action '{consumer}' consumes artifact '{artifact}' before its producer '{producer}' has run")]
    ArtifactUnavailable {
        /// The artifact name.
        artifact: String,
        /// The consuming action.
        consumer: String,
        /// The producing action.
        producer: String,
    },

    /// The artifact wiring contains a cycle.
    #[error("Cycle detected in artifact wiring: {}", path.join(" -> "))]
    CycleDetected {
        /// The nodes forming the cycle.
        path: Vec<String>,
    },

    /// No executor capability is registered for an action's kind.
    #[error("Action '{action}' needs a '{kind}' executor but none is registered")]
    MissingExecutor {
        /// The action name.
        action: String,
        /// The executor kind label.
        kind: &'static str,
    },
}

impl DefinitionError {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyPipelineName => "DEF-001-EMPTY_NAME",
            Self::EmptyPipeline { .. } => "DEF-001-EMPTY",
            Self::EmptyStage { .. } => "DEF-001-EMPTY_STAGE",
            Self::InvalidName { .. } => "DEF-001-INVALID_NAME",
            Self::DuplicateStage { .. } => "DEF-001-DUPLICATE_STAGE",
            Self::DuplicateAction { .. } => "DEF-001-DUPLICATE_ACTION",
            Self::InvalidRunOrder { .. } => "DEF-003-RUN_ORDER",
            Self::InvalidArity { .. } => "DEF-003-ARITY",
            Self::DuplicateArtifactProducer { .. } => "DEF-002-DUPLICATE_PRODUCER",
            Self::ArtifactNotFound { .. } => "DEF-002-ARTIFACT_NOT_FOUND",
            Self::ArtifactUnavailable { .. } => "DEF-002-ARTIFACT_UNAVAILABLE",
            Self::CycleDetected { .. } => "DEF-002-CYCLE",
            Self::MissingExecutor { .. } => "DEF-004-MISSING_EXECUTOR",
        }
    }

    /// Returns a hint for fixing the error, if one applies.
    #[must_use]
    pub fn fix_hint(&self) -> Option<&'static str> {
        match self {
            Self::EmptyPipeline { .. } => Some("Add at least one stage to the pipeline."),
            Self::EmptyStage { .. } => Some("Add at least one action to the stage or remove it."),
            Self::DuplicateArtifactProducer { .. } => Some(
                "Every artifact has exactly one producer. Rename one of the outputs.",
            ),
            Self::ArtifactNotFound { .. } => Some(
                "Check for typos in the input name, or add an action that declares it as an output.",
            ),
            Self::ArtifactUnavailable { .. } => Some(
                "Move the producer to an earlier stage, or give it a lower run order in the same stage.",
            ),
            Self::CycleDetected { .. } => Some("An action cannot consume its own output."),
            Self::MissingExecutor { .. } => {
                Some("Register the capability on the ExecutorRegistry before building the engine.")
            }
            _ => None,
        }
    }

    /// Returns a serializable summary of the error.
    #[must_use]
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_string(),
            summary: self.to_string(),
            fix_hint: self.fix_hint().map(String::from),
        }
    }
}

/// Errors raised by an [`ArtifactStore`](crate::artifacts::ArtifactStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactStoreError {
    /// The artifact was never produced or has been purged.
    #[error("Artifact not found: {reference}")]
    NotFound {
        /// The requested reference.
        reference: String,
    },

    /// The artifact slot has already been written.
    #[error("Artifact already exists: {artifact}")]
    AlreadyExists {
        /// The artifact that was written twice.
        artifact: String,
    },

    /// The backing store is unavailable.
    #[error("Artifact store unavailable: {reason}")]
    Unavailable {
        /// Why the store could not be reached.
        reason: String,
    },
}

/// Errors raised when delivering approval decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// No gate with that key is currently waiting for a decision.
    #[error("No pending approval for gate '{gate}' in run {run_id}")]
    NoPendingGate {
        /// The run ID.
        run_id: String,
        /// The gate name.
        gate: String,
    },

    /// The named action does not exist or is not an approval gate.
    #[error("'{gate}' is not an approval gate of this pipeline")]
    UnknownGate {
        /// The gate name.
        gate: String,
    },
}

/// Errors related to run lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// The requested state transition is not allowed.
    #[error("Illegal run transition from {from} to {to}")]
    IllegalTransition {
        /// The current status.
        from: String,
        /// The requested status.
        to: String,
    },

    /// The run is unknown to this engine.
    #[error("Unknown run: {run_id}")]
    UnknownRun {
        /// The run ID.
        run_id: String,
    },

    /// The run is no longer active.
    #[error("Run {run_id} is not active")]
    NotActive {
        /// The run ID.
        run_id: String,
    },

    /// The run driver task could not be joined.
    #[error("Run task failed: {0}")]
    JoinFailed(String),
}

/// Failure reported by an external executor.
///
/// This is an expected outcome of an action, carried verbatim into the run
/// report. The engine does not interpret the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}")]
pub struct ExecutorFailure {
    /// The raw failure reason from the executor.
    pub reason: String,
}

impl ExecutorFailure {
    /// Creates a new executor failure.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
