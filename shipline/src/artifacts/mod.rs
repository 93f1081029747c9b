//! Artifact storage.
//!
//! Artifacts are immutable once written: every `(run, artifact)` slot
//! accepts exactly one `put`. Stores are keyed by run, so two concurrent runs
//! of the same pipeline never see each other's artifacts.

mod memory;

pub use memory::InMemoryArtifactStore;

use crate::core::{Artifact, ArtifactKey, ArtifactRef, RunId};
use crate::errors::ArtifactStoreError;
use async_trait::async_trait;

/// Durable, content-addressed artifact storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Stores a payload in its write-once slot.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::AlreadyExists`] if the slot is already
    /// occupied, or [`ArtifactStoreError::Unavailable`] if the backend
    /// cannot accept writes.
    async fn put(
        &self,
        key: ArtifactKey,
        payload: serde_json::Value,
    ) -> Result<ArtifactRef, ArtifactStoreError>;

    /// Retrieves an artifact by reference.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::NotFound`] if nothing matching the
    /// reference (including its digest) is stored.
    async fn get(&self, reference: &ArtifactRef) -> Result<Artifact, ArtifactStoreError>;

    /// Lists every artifact stored for a run.
    async fn list_run(&self, run_id: RunId) -> Vec<ArtifactRef>;

    /// Releases every artifact of a run, returning how many were removed.
    async fn purge_run(&self, run_id: RunId) -> usize;
}
