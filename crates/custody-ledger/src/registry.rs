//! Artifact registry seam.
//!
//! Artifacts are produced and owned elsewhere (telephony, transcription,
//! scoring); this ledger only consumes `{type, id, sha256}` references. The
//! one thing it needs from the producer side is live digest reconfirmation:
//! "hash the bytes you hold for this artifact, right now". That powers both
//! the fail-closed check at manifest build time and per-artifact verification
//! later.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Artifact registry lookup failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry has no artifact under this id.
    #[error("artifact not found in registry: {id}")]
    NotFound { id: String },

    /// The registry could not produce a digest (backing store unreachable,
    /// unreadable bytes, ...).
    #[error("registry error for artifact '{id}': {message}")]
    Unavailable { id: String, message: String },
}

/// Read-only view of externally produced artifacts.
///
/// Implementations must recompute the digest from the bytes they actually
/// hold — returning a cached hash would defeat tamper detection.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Digest (`sha256:<hex>`) of the artifact's current bytes.
    async fn live_digest(&self, artifact_id: &str) -> Result<String, RegistryError>;
}

/// In-memory registry over raw artifact bytes.
///
/// Used by tests and by offline verification from local files. Digests are
/// recomputed from the stored bytes on every call, so mutating the bytes is
/// visible to subsequent checks — exactly what tamper tests need.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    artifacts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an artifact's bytes, returning their digest.
    pub fn put(&self, artifact_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> String {
        let bytes = bytes.into();
        let digest = crate::crypto::sha256_hex(&bytes);
        self.artifacts
            .lock()
            .expect("registry mutex poisoned")
            .insert(artifact_id.into(), bytes);
        digest
    }

    /// Overwrite stored bytes without touching anything else. Test hook for
    /// simulating post-bundling tampering at the producer.
    pub fn tamper(&self, artifact_id: &str, bytes: impl Into<Vec<u8>>) {
        self.artifacts
            .lock()
            .expect("registry mutex poisoned")
            .insert(artifact_id.to_string(), bytes.into());
    }

    /// Drop an artifact entirely. Test hook for the vanished-artifact case.
    pub fn remove(&self, artifact_id: &str) {
        self.artifacts
            .lock()
            .expect("registry mutex poisoned")
            .remove(artifact_id);
    }
}

#[async_trait]
impl ArtifactRegistry for InMemoryRegistry {
    async fn live_digest(&self, artifact_id: &str) -> Result<String, RegistryError> {
        let artifacts = self.artifacts.lock().expect("registry mutex poisoned");
        match artifacts.get(artifact_id) {
            Some(bytes) => Ok(crate::crypto::sha256_hex(bytes)),
            None => Err(RegistryError::NotFound {
                id: artifact_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_live_digest_tracks_current_bytes() {
        let registry = InMemoryRegistry::new();
        let original = registry.put("rec_1", b"recording v1".to_vec());

        assert_eq!(registry.live_digest("rec_1").await.unwrap(), original);

        registry.tamper("rec_1", b"recording v1 (altered)".to_vec());
        let after = registry.live_digest("rec_1").await.unwrap();
        assert_ne!(after, original, "digest must follow the live bytes");
    }

    #[tokio::test]
    async fn test_unknown_artifact_is_not_found() {
        let registry = InMemoryRegistry::new();
        let err = registry.live_digest("ghost").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
