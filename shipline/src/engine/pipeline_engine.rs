//! The pipeline engine: trigger interface, run registry and archive.

use super::handle::RunHandle;
use super::report::RunReport;
use super::stage_runner::{StageResult, StageRunner};
use super::state::{FailureInfo, RunShared};
use crate::approval::{ApprovalBroker, ApprovalDecision, PendingApproval};
use crate::artifacts::{ArtifactStore, InMemoryArtifactStore};
use crate::config::EngineConfig;
use crate::core::{PipelineEvent, RunId, RunStatus, SourceRevision, StageStatus, Trigger};
use crate::definition::{PipelineDefinition, PipelineGraph};
use crate::errors::{ApprovalError, DefinitionError, RunError};
use crate::events::{EventSink, LoggingEventSink};
use crate::executors::{ActionDispatcher, ExecutorRegistry, FailureKind};
use crate::utils::now_utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Everything a run needs from its engine.
pub(crate) struct EngineInner {
    pub graph: Arc<PipelineGraph>,
    pub dispatcher: ActionDispatcher,
    pub store: Arc<dyn ArtifactStore>,
    pub events: Arc<dyn EventSink>,
    pub config: EngineConfig,
    active: DashMap<RunId, Arc<RunShared>>,
    archive: Mutex<VecDeque<RunReport>>,
}

impl EngineInner {
    fn archived(&self, run_id: RunId) -> Option<RunReport> {
        self.archive
            .lock()
            .iter()
            .find(|r| r.run_id == run_id)
            .cloned()
    }

    fn archive_report(&self, report: RunReport) {
        let mut archive = self.archive.lock();
        archive.push_back(report);
        while archive.len() > self.config.archive_limit {
            archive.pop_front();
        }
    }

    pub(crate) fn cancel(&self, run_id: RunId, reason: &str) -> Result<(), RunError> {
        match self.active.get(&run_id) {
            Some(shared) => {
                info!(run_id = %run_id, reason, "Cancelling run");
                shared.cancel.cancel(reason);
                Ok(())
            }
            None if self.archived(run_id).is_some() => Err(RunError::NotActive {
                run_id: run_id.to_string(),
            }),
            None => Err(RunError::UnknownRun {
                run_id: run_id.to_string(),
            }),
        }
    }

    pub(crate) fn decide(
        &self,
        run_id: RunId,
        gate: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        let action = self
            .graph
            .find_action(gate)
            .filter(|a| a.executor.is_approval())
            .ok_or_else(|| ApprovalError::UnknownGate {
                gate: gate.to_string(),
            })?;

        info!(run_id = %run_id, gate, verdict = %decision.verdict, actor = %decision.actor, "Delivering approval decision");
        self.dispatcher
            .broker()
            .decide(run_id, action.id, decision)
            .map_err(|_| ApprovalError::NoPendingGate {
                run_id: run_id.to_string(),
                gate: gate.to_string(),
            })
    }
}

impl std::fmt::Debug for EngineInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInner")
            .field("pipeline", &self.graph.name())
            .field("active_runs", &self.active.len())
            .field("archived_runs", &self.archive.lock().len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PipelineEngine`].
#[derive(Debug)]
pub struct EngineBuilder {
    definition: PipelineDefinition,
    registry: ExecutorRegistry,
    store: Option<Arc<dyn ArtifactStore>>,
    events: Option<Arc<dyn EventSink>>,
    broker: Option<Arc<ApprovalBroker>>,
    config: EngineConfig,
}

impl EngineBuilder {
    fn new(definition: PipelineDefinition) -> Self {
        Self {
            definition,
            registry: ExecutorRegistry::new(),
            store: None,
            events: None,
            broker: None,
            config: EngineConfig::default(),
        }
    }

    /// Sets the executor capabilities.
    #[must_use]
    pub fn with_executors(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the artifact store. Defaults to [`InMemoryArtifactStore`].
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the event sink. Defaults to [`LoggingEventSink`].
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shares an approval broker, e.g. with a decision endpoint.
    #[must_use]
    pub fn with_approvals(mut self, broker: Arc<ApprovalBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the definition and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] if the definition is invalid or an
    /// action's executor kind has no registered capability.
    pub fn build(self) -> Result<PipelineEngine, DefinitionError> {
        let graph = self.definition.validate()?;
        self.registry.ensure_supported(&graph)?;

        let broker = self.broker.unwrap_or_default();
        let dispatcher = ActionDispatcher::new(self.registry, broker)
            .with_approval_timeout(self.config.approval_timeout());

        info!(
            pipeline = %graph.name(),
            stages = graph.stages().len(),
            actions = graph.actions().len(),
            "Pipeline engine ready"
        );

        Ok(PipelineEngine {
            inner: Arc::new(EngineInner {
                graph: Arc::new(graph),
                dispatcher,
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(InMemoryArtifactStore::new())),
                events: self.events.unwrap_or_else(|| Arc::new(LoggingEventSink::default())),
                config: self.config,
                active: DashMap::new(),
                archive: Mutex::new(VecDeque::new()),
            }),
        })
    }
}

/// Runs one validated pipeline definition.
///
/// Each trigger creates an independent run with its own artifacts, state and
/// cancellation token. Runs of the same engine share only the artifact store,
/// in which they occupy disjoint slots.
#[derive(Debug, Clone)]
pub struct PipelineEngine {
    inner: Arc<EngineInner>,
}

impl PipelineEngine {
    /// Starts building an engine for a definition.
    #[must_use]
    pub fn builder(definition: PipelineDefinition) -> EngineBuilder {
        EngineBuilder::new(definition)
    }

    /// Starts a run bound to a newly observed source revision.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_source_revision(&self, revision: SourceRevision) -> RunHandle {
        self.trigger(revision, Trigger::SourceRevision)
    }

    /// Starts a run with an explicit trigger.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger(&self, revision: SourceRevision, trigger: Trigger) -> RunHandle {
        let shared = Arc::new(RunShared::new(
            Arc::clone(&self.inner.graph),
            revision,
            trigger,
            Arc::clone(&self.inner.events),
        ));
        self.inner.active.insert(shared.run_id, Arc::clone(&shared));

        let join = tokio::spawn(drive(Arc::clone(&self.inner), Arc::clone(&shared)));
        RunHandle::new(shared, join, Arc::clone(&self.inner))
    }

    /// Starts a fresh run bound to the revision of an earlier run.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::UnknownRun`] if the run is neither active nor
    /// archived.
    pub fn rerun(&self, previous: RunId) -> Result<RunHandle, RunError> {
        let revision = self
            .inner
            .active
            .get(&previous)
            .map(|shared| shared.revision.clone())
            .or_else(|| self.inner.archived(previous).map(|r| r.revision))
            .ok_or_else(|| RunError::UnknownRun {
                run_id: previous.to_string(),
            })?;

        info!(previous = %previous, revision = %revision, "Re-running pipeline");
        Ok(self.trigger(revision, Trigger::ManualRerun { previous }))
    }

    /// Runs a revision to completion and returns its report.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::JoinFailed`] if the run task panicked.
    pub async fn run(&self, revision: SourceRevision) -> Result<RunReport, RunError> {
        self.on_source_revision(revision).wait().await
    }

    /// Delivers an approval decision to a gate of an active run.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::UnknownGate`] if `gate` is not an approval
    /// action of this pipeline, or [`ApprovalError::NoPendingGate`] if the
    /// gate is not currently waiting in that run.
    pub fn decide(
        &self,
        run_id: RunId,
        gate: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        self.inner.decide(run_id, gate, decision)
    }

    /// Cancels an active run.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NotActive`] for finished runs and
    /// [`RunError::UnknownRun`] for runs this engine never started.
    pub fn cancel(&self, run_id: RunId, reason: &str) -> Result<(), RunError> {
        self.inner.cancel(run_id, reason)
    }

    /// Returns the current status of a run.
    #[must_use]
    pub fn status(&self, run_id: RunId) -> Option<RunStatus> {
        self.inner
            .active
            .get(&run_id)
            .map(|shared| shared.status())
            .or_else(|| self.inner.archived(run_id).map(|r| r.status))
    }

    /// Returns a report of an active or archived run.
    #[must_use]
    pub fn report(&self, run_id: RunId) -> Option<RunReport> {
        self.inner
            .active
            .get(&run_id)
            .map(|shared| RunReport::capture(&shared))
            .or_else(|| self.inner.archived(run_id))
    }

    /// Returns the IDs of runs that have not finished.
    #[must_use]
    pub fn active_runs(&self) -> Vec<RunId> {
        let mut runs: Vec<RunId> = self.inner.active.iter().map(|e| *e.key()).collect();
        runs.sort();
        runs
    }

    /// Returns every approval gate currently waiting for a decision.
    #[must_use]
    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.inner.dispatcher.broker().pending()
    }

    /// Returns the validated pipeline graph.
    #[must_use]
    pub fn graph(&self) -> &PipelineGraph {
        &self.inner.graph
    }

    /// Returns the artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.inner.store
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

/// Drives a run through its stages in declaration order.
#[instrument(skip_all, fields(run_id = %shared.run_id, pipeline = %shared.graph.name()))]
async fn drive(inner: Arc<EngineInner>, shared: Arc<RunShared>) -> RunReport {
    if let Err(e) = shared.start().await {
        error!(error = %e, "Run could not start");
    }
    info!(revision = %shared.revision, trigger = %shared.trigger, "Run started");

    let runner = StageRunner::new(&inner, &shared);
    for stage in shared.graph.stages() {
        if let Some(reason) = shared.cancel.reason() {
            shared.update(|s| {
                s.failure = Some(FailureInfo {
                    stage: stage.name.clone(),
                    action: None,
                    reason,
                    kind: FailureKind::Cancelled,
                });
            });
            break;
        }

        shared.set_stage(stage.id, StageStatus::Running);
        info!(stage = %stage.name, "Stage started");
        shared
            .emit(PipelineEvent::stage(shared.run_id, "started", &stage.name))
            .await;

        let result = match (runner.run(stage).await, shared.cancel.reason()) {
            // Outputs settled after the cancel were orphaned, so the stage did not complete.
            (StageResult::Succeeded, Some(reason)) => StageResult::Failed(FailureInfo {
                stage: stage.name.clone(),
                action: None,
                reason,
                kind: FailureKind::Cancelled,
            }),
            (result, _) => result,
        };

        match result {
            StageResult::Succeeded => {
                shared.set_stage(stage.id, StageStatus::Succeeded);
                info!(stage = %stage.name, "Stage succeeded");
                shared
                    .emit(PipelineEvent::stage(shared.run_id, "succeeded", &stage.name))
                    .await;
            }
            StageResult::Failed(failure) => {
                shared.set_stage(stage.id, StageStatus::Failed);
                warn!(stage = %stage.name, reason = %failure.reason, kind = %failure.kind, "Stage failed");
                shared
                    .emit(
                        PipelineEvent::stage(shared.run_id, "failed", &stage.name)
                            .add_data("reason", serde_json::json!(failure.reason)),
                    )
                    .await;
                shared.update(|s| s.failure = Some(failure));
                break;
            }
        }
    }

    finish(&inner, &shared).await
}

/// Moves a run to its terminal status, archives its report and forgets it.
async fn finish(inner: &EngineInner, shared: &RunShared) -> RunReport {
    let failed = shared.read(|s| s.failure.is_some());

    if failed && !inner.config.retain_artifacts_on_failure {
        let purged = inner.store.purge_run(shared.run_id).await;
        shared.update(|s| {
            let mut released: Vec<_> = std::mem::take(&mut s.artifacts).into_values().collect();
            released.append(&mut s.orphaned);
            s.released = released;
        });
        info!(purged, "Released artifacts of failed run");
    }

    let status = if failed {
        RunStatus::Failed
    } else {
        RunStatus::Succeeded
    };
    shared.update(|s| s.finished_at = Some(now_utc()));
    if let Err(e) = shared.transition(status) {
        error!(error = %e, "Run could not reach its terminal status");
    }

    let report = RunReport::capture(shared);
    match &report.failure {
        Some(failure) => warn!(
            stage = %failure.stage,
            action = failure.action.as_deref().unwrap_or("-"),
            reason = %failure.reason,
            duration_ms = report.duration_ms,
            "Run failed"
        ),
        None => info!(duration_ms = report.duration_ms, "Run succeeded"),
    }

    inner.archive_report(report.clone());
    inner.active.remove(&shared.run_id);
    inner.dispatcher.broker().withdraw_run(shared.run_id);
    report
}
