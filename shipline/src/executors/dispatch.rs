//! The single `execute` contract over every executor kind.

use super::{ExecutionScope, ExecutorRegistry};
use crate::approval::{ApprovalBroker, ApprovalRecord, GateRequest, GateResolution};
use crate::cancellation::CancellationToken;
use crate::core::{Artifact, ArtifactId, RunId, SourceRevision};
use crate::definition::{ActionNode, ApprovalConfig, ExecutorKind, SourceConfig};
use crate::errors::ExecutorFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Why an action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external capability reported failure.
    Executor,
    /// An approver rejected the gate.
    Rejected,
    /// No approval decision arrived in time.
    ApprovalTimeout,
    /// The run or the action's group was cancelled.
    Cancelled,
    /// The engine could not run the action (store or task failure).
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Executor => "executor",
            Self::Rejected => "rejected",
            Self::ApprovalTimeout => "approval_timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Terminal result of one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action succeeded.
    Succeeded {
        /// Payloads for the action's declared outputs. The engine stores them.
        outputs: Vec<(ArtifactId, serde_json::Value)>,
        /// The decision, for approval gates.
        approval: Option<ApprovalRecord>,
    },
    /// The action failed.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Raw failure reason.
        reason: String,
        /// The decision, for rejected gates.
        approval: Option<ApprovalRecord>,
    },
}

impl ActionOutcome {
    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            reason: reason.into(),
            approval: None,
        }
    }

    /// Returns true for success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    fn from_payload(action: &ActionNode, result: Result<serde_json::Value, ExecutorFailure>) -> Self {
        match result {
            Ok(payload) => Self::Succeeded {
                outputs: action.outputs.first().map(|id| vec![(*id, payload)]).unwrap_or_default(),
                approval: None,
            },
            Err(failure) => Self::failed(FailureKind::Executor, failure.reason),
        }
    }
}

/// Receives approval gate transitions so the run can park and resume.
pub trait GateListener: Send + Sync {
    /// A gate started waiting.
    fn gate_opened(&self, gate: &ActionNode);

    /// A gate stopped waiting. `record` is set when a decision arrived.
    fn gate_closed(&self, gate: &ActionNode, record: Option<&ApprovalRecord>);
}

/// Everything an action needs to execute.
pub struct ActionContext<'a> {
    /// The run.
    pub run_id: RunId,
    /// The pipeline name.
    pub pipeline: &'a str,
    /// The enclosing stage name.
    pub stage: &'a str,
    /// The revision the run is bound to.
    pub revision: &'a SourceRevision,
    /// The action to execute.
    pub action: &'a ActionNode,
    /// Resolved input artifacts, in declaration order.
    pub inputs: Vec<Artifact>,
    /// Cancellation for this action's group.
    pub cancel: &'a CancellationToken,
    /// Gate transition listener.
    pub listener: &'a dyn GateListener,
}

impl ActionContext<'_> {
    /// Returns the executor scope.
    #[must_use]
    pub fn scope(&self) -> ExecutionScope {
        ExecutionScope {
            run_id: self.run_id,
            pipeline: self.pipeline.to_string(),
            stage: self.stage.to_string(),
            action: self.action.name.clone(),
        }
    }

    fn single_input(&self) -> Result<&Artifact, ActionOutcome> {
        self.inputs.first().ok_or_else(|| {
            ActionOutcome::failed(
                FailureKind::Internal,
                format!("action '{}' has no resolved input artifact", self.action.name),
            )
        })
    }
}

impl fmt::Debug for ActionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("run_id", &self.run_id)
            .field("stage", &self.stage)
            .field("action", &self.action.name)
            .field("inputs", &self.inputs.len())
            .finish_non_exhaustive()
    }
}

fn missing(kind: &str) -> ActionOutcome {
    ActionOutcome::failed(FailureKind::Internal, format!("no {kind} executor registered"))
}

/// Dispatches actions to the capability for their executor kind.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    registry: ExecutorRegistry,
    broker: Arc<ApprovalBroker>,
    approval_timeout: Option<Duration>,
}

impl ActionDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(registry: ExecutorRegistry, broker: Arc<ApprovalBroker>) -> Self {
        Self {
            registry,
            broker,
            approval_timeout: None,
        }
    }

    /// Sets the default approval timeout. `None` waits indefinitely.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout = timeout;
        self
    }

    /// Returns the capability registry.
    #[must_use]
    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Returns the approval broker.
    #[must_use]
    pub fn broker(&self) -> &Arc<ApprovalBroker> {
        &self.broker
    }

    /// Executes one action to a terminal outcome.
    pub async fn execute(&self, ctx: &ActionContext<'_>) -> ActionOutcome {
        let scope = ctx.scope();
        debug!(run_id = %ctx.run_id, action = %ctx.action.name, kind = %ctx.action.executor, "Dispatching action");

        match &ctx.action.executor {
            ExecutorKind::Source(config) => self.fetch(ctx, &scope, config).await,
            ExecutorKind::Build(config) => {
                let Some(runner) = self.registry.build() else {
                    return missing("build");
                };
                let source = match ctx.single_input() {
                    Ok(source) => source,
                    Err(outcome) => return outcome,
                };
                ActionOutcome::from_payload(ctx.action, runner.build(&scope, source, config).await)
            }
            ExecutorKind::Publish(config) => {
                let Some(publisher) = self.registry.publish() else {
                    return missing("publish");
                };
                let source = match ctx.single_input() {
                    Ok(source) => source,
                    Err(outcome) => return outcome,
                };
                ActionOutcome::from_payload(ctx.action, publisher.publish(&scope, source, config).await)
            }
            ExecutorKind::Deploy(config) => {
                let Some(deployer) = self.registry.deploy() else {
                    return missing("deploy");
                };
                let artifact = match ctx.single_input() {
                    Ok(artifact) => artifact,
                    Err(outcome) => return outcome,
                };
                match deployer.deploy(&scope, artifact, config).await {
                    Ok(()) => ActionOutcome::Succeeded {
                        outputs: Vec::new(),
                        approval: None,
                    },
                    Err(failure) => ActionOutcome::failed(FailureKind::Executor, failure.reason),
                }
            }
            ExecutorKind::ManualApproval(config) => self.await_approval(ctx, config).await,
        }
    }

    async fn fetch(
        &self,
        ctx: &ActionContext<'_>,
        scope: &ExecutionScope,
        config: &SourceConfig,
    ) -> ActionOutcome {
        let Some(provider) = self.registry.source() else {
            return missing("source");
        };

        let token = match &config.token_secret {
            Some(name) => {
                let Some(secrets) = self.registry.secrets() else {
                    return missing("secrets");
                };
                match secrets.resolve(name).await {
                    Ok(secret) => Some(secret),
                    Err(failure) => return ActionOutcome::failed(FailureKind::Executor, failure.reason),
                }
            }
            None => None,
        };

        let result = provider.fetch(scope, ctx.revision, config, token.as_ref()).await;
        ActionOutcome::from_payload(ctx.action, result)
    }

    async fn await_approval(&self, ctx: &ActionContext<'_>, config: &ApprovalConfig) -> ActionOutcome {
        let gate = self.broker.open(GateRequest {
            run_id: ctx.run_id,
            gate: ctx.action.id,
            gate_name: ctx.action.name.clone(),
            instructions: config.instructions.clone(),
            external_link: config.external_link.clone(),
        });
        let requested_at = gate.requested_at();
        ctx.listener.gate_opened(ctx.action);

        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.approval_timeout);
        info!(run_id = %ctx.run_id, gate = %ctx.action.name, timeout = ?timeout, "Awaiting approval");

        match gate.wait(timeout, ctx.cancel).await {
            GateResolution::Decided(decision) => {
                let approved = decision.is_approved();
                let record = ApprovalRecord::new(&ctx.action.name, decision, requested_at);
                ctx.listener.gate_closed(ctx.action, Some(&record));
                if approved {
                    ActionOutcome::Succeeded {
                        outputs: Vec::new(),
                        approval: Some(record),
                    }
                } else {
                    let reason = match &record.comment {
                        Some(comment) => format!("rejected by {}: {comment}", record.actor),
                        None => format!("rejected by {}", record.actor),
                    };
                    ActionOutcome::Failed {
                        kind: FailureKind::Rejected,
                        reason,
                        approval: Some(record),
                    }
                }
            }
            GateResolution::TimedOut(limit) => {
                ctx.listener.gate_closed(ctx.action, None);
                ActionOutcome::failed(
                    FailureKind::ApprovalTimeout,
                    format!("no approval decision within {}s", limit.as_secs()),
                )
            }
            GateResolution::Cancelled(reason) => {
                ctx.listener.gate_closed(ctx.action, None);
                ActionOutcome::failed(FailureKind::Cancelled, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalDecision;
    use crate::core::{ActionId, ArtifactKey, StageId};
    use crate::definition::{BuildConfig, DeployConfig, SourceConfig};
    use crate::executors::{MockSecretsProvider, Secret};
    use crate::testing::ScriptedCapabilities;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<String>>,
    }

    impl GateListener for RecordingListener {
        fn gate_opened(&self, gate: &ActionNode) {
            self.calls.lock().push(format!("opened:{}", gate.name));
        }

        fn gate_closed(&self, gate: &ActionNode, record: Option<&ApprovalRecord>) {
            let verdict = record.map_or_else(|| "none".to_string(), |r| r.verdict.to_string());
            self.calls.lock().push(format!("closed:{}:{verdict}", gate.name));
        }
    }

    fn node(name: &str, executor: ExecutorKind, inputs: usize, outputs: usize) -> ActionNode {
        ActionNode {
            id: ActionId::new(0),
            stage: StageId::new(0),
            name: name.to_string(),
            executor,
            run_order: 1,
            inputs: (0..inputs).map(ArtifactId::new).collect(),
            outputs: (0..outputs).map(|i| ArtifactId::new(10 + i)).collect(),
        }
    }

    fn input() -> Artifact {
        Artifact::seal(
            ArtifactKey::new(RunId::new(), ArtifactId::new(0), "src", ActionId::new(9)),
            serde_json::json!({"commit": "abc123"}),
        )
    }

    fn context<'a>(
        action: &'a ActionNode,
        revision: &'a SourceRevision,
        inputs: Vec<Artifact>,
        cancel: &'a CancellationToken,
        listener: &'a dyn GateListener,
    ) -> ActionContext<'a> {
        ActionContext {
            run_id: RunId::new(),
            pipeline: "web",
            stage: "Stage",
            revision,
            action,
            inputs,
            cancel,
            listener,
        }
    }

    fn dispatcher(scripted: Arc<ScriptedCapabilities>) -> ActionDispatcher {
        let registry = ExecutorRegistry::new()
            .with_source(scripted.clone())
            .with_build(scripted.clone())
            .with_publish(scripted.clone())
            .with_deploy(scripted);
        ActionDispatcher::new(registry, Arc::new(ApprovalBroker::new()))
    }

    #[tokio::test]
    async fn test_build_output_bound_to_declared_artifact() {
        let dispatcher = dispatcher(Arc::new(ScriptedCapabilities::new()));
        let action = node("Compile", ExecutorKind::Build(BuildConfig::new("b.yml")), 1, 1);
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, vec![input()], &cancel, &listener))
            .await;

        match outcome {
            ActionOutcome::Succeeded { outputs, approval } => {
                assert_eq!(outputs.len(), 1);
                assert_eq!(outputs[0].0, ArtifactId::new(10));
                assert!(approval.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_build_without_output_discards_payload() {
        let dispatcher = dispatcher(Arc::new(ScriptedCapabilities::new()));
        let action = node("Unit-Test", ExecutorKind::Build(BuildConfig::new("t.yml")), 1, 0);
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, vec![input()], &cancel, &listener))
            .await;
        assert_eq!(
            outcome,
            ActionOutcome::Succeeded {
                outputs: Vec::new(),
                approval: None
            }
        );
    }

    #[tokio::test]
    async fn test_executor_failure_reason_verbatim() {
        let scripted = Arc::new(ScriptedCapabilities::new().fail("Ship", "deployment rejected"));
        let dispatcher = dispatcher(scripted);
        let action = node("Ship", ExecutorKind::Deploy(DeployConfig::new("svc")), 1, 0);
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, vec![input()], &cancel, &listener))
            .await;
        assert_eq!(
            outcome,
            ActionOutcome::failed(FailureKind::Executor, "deployment rejected")
        );
    }

    #[tokio::test]
    async fn test_missing_capability_is_internal_failure() {
        let dispatcher = ActionDispatcher::new(ExecutorRegistry::new(), Arc::new(ApprovalBroker::new()));
        let action = node("Compile", ExecutorKind::Build(BuildConfig::new("b.yml")), 1, 1);
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, vec![input()], &cancel, &listener))
            .await;
        assert!(matches!(outcome, ActionOutcome::Failed { kind: FailureKind::Internal, .. }));
    }

    #[tokio::test]
    async fn test_source_resolves_token_secret() {
        let mut secrets = MockSecretsProvider::new();
        secrets
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(Secret::new("ghp_token")));

        let scripted = Arc::new(ScriptedCapabilities::new());
        let registry = ExecutorRegistry::new()
            .with_source(scripted.clone())
            .with_secrets(Arc::new(secrets));
        let dispatcher = ActionDispatcher::new(registry, Arc::new(ApprovalBroker::new()));
        let action = node(
            "Fetch",
            ExecutorKind::Source(SourceConfig::github("acme", "web").with_token_secret("gh")),
            0,
            1,
        );
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, Vec::new(), &cancel, &listener))
            .await;
        assert!(outcome.is_success());
        assert_eq!(scripted.log().calls_for("Fetch").len(), 1);
        assert!(scripted.log().calls_for("Fetch")[0].authenticated);
    }

    #[tokio::test]
    async fn test_secret_failure_fails_source() {
        let mut secrets = MockSecretsProvider::new();
        secrets
            .expect_resolve()
            .returning(|_| Err(ExecutorFailure::new("secret not found")));

        let scripted = Arc::new(ScriptedCapabilities::new());
        let registry = ExecutorRegistry::new()
            .with_source(scripted.clone())
            .with_secrets(Arc::new(secrets));
        let dispatcher = ActionDispatcher::new(registry, Arc::new(ApprovalBroker::new()));
        let action = node(
            "Fetch",
            ExecutorKind::Source(SourceConfig::github("acme", "web").with_token_secret("gh")),
            0,
            1,
        );
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, Vec::new(), &cancel, &listener))
            .await;
        assert_eq!(outcome, ActionOutcome::failed(FailureKind::Executor, "secret not found"));
        assert!(scripted.log().is_empty());
    }

    #[tokio::test]
    async fn test_approval_gate_approved() {
        let dispatcher = dispatcher(Arc::new(ScriptedCapabilities::new()));
        let broker = dispatcher.broker().clone();
        let action = node(
            "Approve",
            ExecutorKind::ManualApproval(ApprovalConfig::default()),
            0,
            0,
        );
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();
        let ctx = context(&action, &revision, Vec::new(), &cancel, &listener);
        let run_id = ctx.run_id;

        let decider = tokio::spawn(async move {
            while broker.pending_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            broker.decide(run_id, ActionId::new(0), ApprovalDecision::approve("alice"))
        });

        let outcome = dispatcher.execute(&ctx).await;
        decider.await.unwrap().unwrap();

        match outcome {
            ActionOutcome::Succeeded { approval: Some(record), .. } => assert_eq!(record.actor, "alice"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            *listener.calls.lock(),
            vec!["opened:Approve".to_string(), "closed:Approve:approve".to_string()]
        );
    }

    #[tokio::test]
    async fn test_approval_gate_times_out() {
        let dispatcher = dispatcher(Arc::new(ScriptedCapabilities::new()));
        let action = node(
            "Approve",
            ExecutorKind::ManualApproval(ApprovalConfig::default().with_timeout_secs(0)),
            0,
            0,
        );
        let revision = SourceRevision::new("abc123");
        let cancel = CancellationToken::new();
        let listener = RecordingListener::default();

        let outcome = dispatcher
            .execute(&context(&action, &revision, Vec::new(), &cancel, &listener))
            .await;
        assert!(matches!(
            outcome,
            ActionOutcome::Failed { kind: FailureKind::ApprovalTimeout, .. }
        ));
        assert_eq!(listener.calls.lock().last().map(String::as_str), Some("closed:Approve:none"));
        assert_eq!(dispatcher.broker().pending_count(), 0);
    }
}
