//! In-memory artifact store.

use super::ArtifactStore;
use crate::core::{Artifact, ArtifactId, ArtifactKey, ArtifactRef, RunId};
use crate::errors::ArtifactStoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Artifact store backed by a concurrent map.
///
/// Suitable for tests and single-process deployments. Artifacts live until
/// the run is purged or the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: DashMap<(RunId, ArtifactId), Artifact>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(
        &self,
        key: ArtifactKey,
        payload: serde_json::Value,
    ) -> Result<ArtifactRef, ArtifactStoreError> {
        match self.artifacts.entry((key.run_id, key.artifact)) {
            Entry::Occupied(existing) => Err(ArtifactStoreError::AlreadyExists {
                artifact: existing.get().reference.to_string(),
            }),
            Entry::Vacant(slot) => {
                let artifact = Artifact::seal(key, payload);
                let reference = artifact.reference.clone();
                debug!(artifact = %reference, "Stored artifact");
                slot.insert(artifact);
                Ok(reference)
            }
        }
    }

    async fn get(&self, reference: &ArtifactRef) -> Result<Artifact, ArtifactStoreError> {
        self.artifacts
            .get(&(reference.run_id, reference.artifact))
            .filter(|stored| stored.reference.digest == reference.digest)
            .map(|stored| stored.value().clone())
            .ok_or_else(|| ArtifactStoreError::NotFound {
                reference: reference.to_string(),
            })
    }

    async fn list_run(&self, run_id: RunId) -> Vec<ArtifactRef> {
        let mut refs: Vec<ArtifactRef> = self
            .artifacts
            .iter()
            .filter(|entry| entry.key().0 == run_id)
            .map(|entry| entry.reference.clone())
            .collect();
        refs.sort_by_key(|r| r.artifact);
        refs
    }

    async fn purge_run(&self, run_id: RunId) -> usize {
        let before = self.artifacts.len();
        self.artifacts.retain(|(owner, _), _| *owner != run_id);
        before.saturating_sub(self.artifacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionId;
    use pretty_assertions::assert_eq;

    fn key(run_id: RunId, artifact: usize, name: &str) -> ArtifactKey {
        ArtifactKey::new(run_id, ArtifactId::new(artifact), name, ActionId::new(0))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::new();
        let payload = serde_json::json!({"commit": "abc123"});

        let reference = store.put(key(run_id, 0, "src"), payload.clone()).await.unwrap();
        let artifact = store.get(&reference).await.unwrap();

        assert_eq!(artifact.payload, payload);
        assert_eq!(artifact.reference, reference);
    }

    #[tokio::test]
    async fn test_slot_is_write_once() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::new();

        store.put(key(run_id, 0, "src"), serde_json::json!(1)).await.unwrap();
        let err = store
            .put(key(run_id, 0, "src"), serde_json::json!(2))
            .await
            .unwrap_err();

        assert!(matches!(err, ArtifactStoreError::AlreadyExists { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let store = InMemoryArtifactStore::new();
        let first = RunId::new();
        let second = RunId::new();

        let a = store.put(key(first, 0, "src"), serde_json::json!("a")).await.unwrap();
        let b = store.put(key(second, 0, "src"), serde_json::json!("b")).await.unwrap();

        assert_eq!(store.get(&a).await.unwrap().payload, serde_json::json!("a"));
        assert_eq!(store.get(&b).await.unwrap().payload, serde_json::json!("b"));
        assert_eq!(store.list_run(first).await, vec![a]);
    }

    #[tokio::test]
    async fn test_get_rejects_digest_mismatch() {
        let store = InMemoryArtifactStore::new();
        let mut reference = store
            .put(key(RunId::new(), 0, "src"), serde_json::json!("a"))
            .await
            .unwrap();
        reference.digest = "0".repeat(64);

        let err = store.get(&reference).await.unwrap_err();
        assert!(matches!(err, ArtifactStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_purge_run() {
        let store = InMemoryArtifactStore::new();
        let doomed = RunId::new();
        let kept = RunId::new();

        store.put(key(doomed, 0, "src"), serde_json::json!(1)).await.unwrap();
        store.put(key(doomed, 1, "image"), serde_json::json!(2)).await.unwrap();
        store.put(key(kept, 0, "src"), serde_json::json!(3)).await.unwrap();

        assert_eq!(store.purge_run(doomed).await, 2);
        assert!(store.list_run(doomed).await.is_empty());
        assert_eq!(store.list_run(kept).await.len(), 1);
    }
}
