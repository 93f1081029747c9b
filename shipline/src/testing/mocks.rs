//! Scripted executor capabilities for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::{Artifact, RunId, SourceRevision};
use crate::definition::{BuildConfig, DeployConfig, PublishConfig, SourceConfig};
use crate::errors::ExecutorFailure;
use crate::executors::{
    BuildRunner, Deployer, ExecutionScope, ImagePublisher, Secret, SecretsProvider, SourceProvider,
};

/// One recorded capability invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    /// The run the call belonged to.
    pub run_id: RunId,
    /// The action name.
    pub action: String,
    /// The capability called ("fetch", "build", "publish", "deploy").
    pub capability: &'static str,
    /// Digest of the input artifact, if any.
    pub input_digest: Option<String>,
    /// Whether a credential was supplied.
    pub authenticated: bool,
    /// Global sequence number when the call started.
    pub started: u64,
    /// Global sequence number when the call returned. `None` if the call was
    /// dropped before completing.
    pub finished: Option<u64>,
}

/// Records every capability call with a global sequence number.
///
/// Sequence numbers are shared between starts and finishes, so
/// `a.finished < b.started` means `a` completed before `b` began.
#[derive(Debug, Default)]
pub struct CallLog {
    seq: AtomicU64,
    records: Mutex<Vec<CallRecord>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn start(
        &self,
        scope: &ExecutionScope,
        capability: &'static str,
        input: Option<&Artifact>,
        authenticated: bool,
    ) -> usize {
        let mut records = self.records.lock();
        records.push(CallRecord {
            run_id: scope.run_id,
            action: scope.action.clone(),
            capability,
            input_digest: input.map(|a| a.reference.digest.clone()),
            authenticated,
            started: self.next(),
            finished: None,
        });
        records.len() - 1
    }

    fn finish(&self, index: usize) {
        let seq = self.next();
        if let Some(record) = self.records.lock().get_mut(index) {
            record.finished = Some(seq);
        }
    }

    /// Returns all calls in start order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }

    /// Returns the calls made for one action.
    #[must_use]
    pub fn calls_for(&self, action: &str) -> Vec<CallRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }

    /// Returns the calls made within one run.
    #[must_use]
    pub fn calls_in(&self, run_id: RunId) -> Vec<CallRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Returns the action names in start order.
    #[must_use]
    pub fn actions(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.action.clone()).collect()
    }

    /// Returns true if the action was called at least once.
    #[must_use]
    pub fn called(&self, action: &str) -> bool {
        self.records.lock().iter().any(|r| r.action == action)
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was called.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// In-memory implementation of every external capability.
///
/// Succeeds by default with a deterministic payload; individual actions can
/// be scripted to fail or to take time.
#[derive(Debug, Default)]
pub struct ScriptedCapabilities {
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    log: CallLog,
}

impl ScriptedCapabilities {
    /// Creates capabilities where every call succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the named action fail with `reason`.
    #[must_use]
    pub fn fail(mut self, action: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(action.into(), reason.into());
        self
    }

    /// Makes the named action take `delay` before returning.
    #[must_use]
    pub fn delay(mut self, action: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(action.into(), delay);
        self
    }

    /// Returns the call log.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    async fn invoke(
        &self,
        scope: &ExecutionScope,
        capability: &'static str,
        input: Option<&Artifact>,
        authenticated: bool,
    ) -> Result<(), ExecutorFailure> {
        let index = self.log.start(scope, capability, input, authenticated);
        if let Some(delay) = self.delays.get(&scope.action) {
            tokio::time::sleep(*delay).await;
        }
        self.log.finish(index);

        match self.failures.get(&scope.action) {
            Some(reason) => Err(ExecutorFailure::new(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SourceProvider for ScriptedCapabilities {
    async fn fetch(
        &self,
        scope: &ExecutionScope,
        revision: &SourceRevision,
        config: &SourceConfig,
        token: Option<&Secret>,
    ) -> Result<serde_json::Value, ExecutorFailure> {
        self.invoke(scope, "fetch", None, token.is_some()).await?;
        Ok(serde_json::json!({
            "repo": config.full_name(),
            "branch": config.branch,
            "commit": revision.commit,
        }))
    }
}

#[async_trait]
impl BuildRunner for ScriptedCapabilities {
    async fn build(
        &self,
        scope: &ExecutionScope,
        source: &Artifact,
        config: &BuildConfig,
    ) -> Result<serde_json::Value, ExecutorFailure> {
        self.invoke(scope, "build", Some(source), false).await?;
        Ok(serde_json::json!({
            "script": config.script,
            "built_from": source.reference.digest,
        }))
    }
}

#[async_trait]
impl ImagePublisher for ScriptedCapabilities {
    async fn publish(
        &self,
        scope: &ExecutionScope,
        source: &Artifact,
        config: &PublishConfig,
    ) -> Result<serde_json::Value, ExecutorFailure> {
        self.invoke(scope, "publish", Some(source), false).await?;
        Ok(serde_json::json!({
            "image": config.image_uri(),
            "source_digest": source.reference.digest,
        }))
    }
}

#[async_trait]
impl Deployer for ScriptedCapabilities {
    async fn deploy(
        &self,
        scope: &ExecutionScope,
        artifact: &Artifact,
        _config: &DeployConfig,
    ) -> Result<(), ExecutorFailure> {
        self.invoke(scope, "deploy", Some(artifact), false).await
    }
}

/// Secrets provider backed by a fixed map.
#[derive(Debug, Default)]
pub struct StaticSecrets {
    secrets: HashMap<String, String>,
}

impl StaticSecrets {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretsProvider for StaticSecrets {
    async fn resolve(&self, name: &str) -> Result<Secret, ExecutorFailure> {
        self.secrets
            .get(name)
            .map(Secret::new)
            .ok_or_else(|| ExecutorFailure::new(format!("secret '{name}' not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionId, ArtifactId, ArtifactKey};

    fn scope(action: &str) -> ExecutionScope {
        ExecutionScope {
            run_id: RunId::new(),
            pipeline: "web".to_string(),
            stage: "Build".to_string(),
            action: action.to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_failure_and_log() {
        let caps = ScriptedCapabilities::new().fail("Docker-Push", "push denied");
        let source = Artifact::seal(
            ArtifactKey::new(RunId::new(), ArtifactId::new(0), "src", ActionId::new(0)),
            serde_json::json!({"commit": "abc"}),
        );

        let image = caps
            .publish(&scope("Docker-Push"), &source, &PublishConfig::new("repo"))
            .await;
        assert_eq!(image, Err(ExecutorFailure::new("push denied")));

        let built = caps
            .build(&scope("Compile"), &source, &BuildConfig::new("b.yml"))
            .await
            .unwrap();
        assert_eq!(built["built_from"], serde_json::json!(source.reference.digest));

        let calls = caps.log().calls();
        assert_eq!(caps.log().actions(), vec!["Docker-Push", "Compile"]);
        assert!(calls[0].finished.unwrap() < calls[1].started);
        assert_eq!(calls[1].input_digest.as_deref(), Some(source.reference.digest.as_str()));
    }

    #[tokio::test]
    async fn test_static_secrets() {
        let secrets = StaticSecrets::new().with("github/personal_access_token", "ghp");
        assert_eq!(
            secrets.resolve("github/personal_access_token").await.unwrap().expose(),
            "ghp"
        );
        assert!(secrets.resolve("missing").await.is_err());
    }
}
