//! Artifacts handed off between actions.

use super::{ActionId, ArtifactId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// The write-once slot an artifact occupies within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// The run that produced the artifact.
    pub run_id: RunId,
    /// The declared artifact.
    pub artifact: ArtifactId,
    /// The declared artifact name.
    pub name: String,
    /// The single action allowed to produce it.
    pub producer: ActionId,
}

impl ArtifactKey {
    /// Creates a new artifact key.
    #[must_use]
    pub fn new(run_id: RunId, artifact: ArtifactId, name: impl Into<String>, producer: ActionId) -> Self {
        Self {
            run_id,
            artifact,
            name: name.into(),
            producer,
        }
    }
}

/// A content-addressed handle to a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// The run that produced the artifact.
    pub run_id: RunId,
    /// The declared artifact.
    pub artifact: ArtifactId,
    /// The declared artifact name.
    pub name: String,
    /// The producing action.
    pub producer: ActionId,
    /// SHA-256 of the payload, hex encoded.
    pub digest: String,
}

impl ArtifactRef {
    /// Returns the slot this reference points into.
    #[must_use]
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.run_id, self.artifact, &self.name, self.producer)
    }

    /// Returns the first 12 characters of the digest.
    #[must_use]
    pub fn short_digest(&self) -> &str {
        self.digest.get(..12).unwrap_or(&self.digest)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.short_digest(), self.run_id)
    }
}

/// An immutable artifact: its reference plus the opaque payload.
///
/// Payloads are whatever the producing executor returned, e.g. a source
/// archive location or an image URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// The content-addressed reference.
    pub reference: ArtifactRef,
    /// The artifact data.
    pub payload: serde_json::Value,
    /// When the artifact was stored.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Seals a payload into an artifact for the given slot.
    #[must_use]
    pub fn seal(key: ArtifactKey, payload: serde_json::Value) -> Self {
        let digest = content_digest(&payload);
        Self {
            reference: ArtifactRef {
                run_id: key.run_id,
                artifact: key.artifact,
                name: key.name,
                producer: key.producer,
                digest,
            },
            payload,
            created_at: Utc::now(),
        }
    }

    /// Returns the declared artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

/// Computes the hex SHA-256 digest of a JSON payload.
#[must_use]
pub fn content_digest(payload: &serde_json::Value) -> String {
    hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ArtifactKey {
        ArtifactKey::new(RunId::new(), ArtifactId::new(0), "src", ActionId::new(0))
    }

    #[test]
    fn test_seal_computes_digest() {
        let payload = serde_json::json!({"commit": "abc123"});
        let artifact = Artifact::seal(key(), payload.clone());

        assert_eq!(artifact.name(), "src");
        assert_eq!(artifact.reference.digest, content_digest(&payload));
        assert_eq!(artifact.reference.digest.len(), 64);
    }

    #[test]
    fn test_digest_depends_on_content() {
        let a = content_digest(&serde_json::json!({"image": "repo:latest"}));
        let b = content_digest(&serde_json::json!({"image": "repo:v2"}));
        assert_ne!(a, b);
    }

    #[test]
    fn test_reference_key_roundtrip() {
        let k = key();
        let artifact = Artifact::seal(k.clone(), serde_json::json!(null));
        assert_eq!(artifact.reference.key(), k);
        assert_eq!(artifact.reference.short_digest().len(), 12);
    }
}
