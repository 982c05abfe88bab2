//! Manifest builder.
//!
//! Always produces a NEW manifest version — prior versions are never
//! mutated; supersession is the store's one-time forward pointer. Build fails
//! closed if any referenced artifact's live hash can no longer be reconfirmed
//! against the registry: certifying a manifest over already-corrupted input
//! would defeat the whole exercise.

use crate::crypto::compute_manifest_hash;
use crate::error::LedgerError;
use crate::registry::ArtifactRegistry;
use crate::types::{ArtifactRef, Manifest};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// Inputs for one manifest version.
#[derive(Debug, Clone)]
pub struct ManifestInput {
    pub organization_id: String,
    pub call_id: String,
    /// Version to claim; the store's uniqueness constraint arbitrates races
    pub version: u32,
    /// Ordered artifact descriptors; order is preserved and semantic
    pub artifacts: Vec<ArtifactRef>,
    /// Triggering actor
    pub created_by: String,
}

/// Build a manifest after reconfirming every artifact hash against the
/// registry. Nothing is persisted here; the caller inserts the result.
pub async fn build_manifest(
    registry: &dyn ArtifactRegistry,
    input: ManifestInput,
) -> Result<Manifest, LedgerError> {
    if input.artifacts.is_empty() {
        return Err(LedgerError::EmptyManifest {
            call_id: input.call_id,
        });
    }

    for artifact in &input.artifacts {
        let live = registry.live_digest(&artifact.id).await?;
        if live != artifact.sha256 {
            return Err(LedgerError::InputIntegrity {
                artifact_id: artifact.id.clone(),
                expected: artifact.sha256.clone(),
                actual: live,
            });
        }
    }

    let mut manifest = Manifest {
        id: Uuid::now_v7(),
        version: input.version,
        organization_id: input.organization_id,
        call_id: input.call_id,
        artifacts: input.artifacts,
        manifest_hash: String::new(),
        created_at: Utc::now(),
        created_by: input.created_by,
        superseded_by: None,
    };
    manifest.manifest_hash = compute_manifest_hash(&manifest)?;

    debug!(
        manifest_id = %manifest.id,
        call_id = %manifest.call_id,
        version = manifest.version,
        artifacts = manifest.artifacts.len(),
        hash = %manifest.manifest_hash,
        "manifest built"
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::types::ArtifactKind;

    fn input(artifacts: Vec<ArtifactRef>) -> ManifestInput {
        ManifestInput {
            organization_id: "org_test".into(),
            call_id: "call_m1".into(),
            version: 1,
            artifacts,
            created_by: "svc_finalizer".into(),
        }
    }

    #[tokio::test]
    async fn test_build_preserves_artifact_order_and_binds_hash() {
        let registry = InMemoryRegistry::new();
        let rec = registry.put("rec_1", b"audio".to_vec());
        let tx = registry.put("tx_1", b"words".to_vec());

        let manifest = build_manifest(
            &registry,
            input(vec![
                ArtifactRef::new(ArtifactKind::Recording, "rec_1", rec),
                ArtifactRef::new(ArtifactKind::Transcript, "tx_1", tx),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(manifest.artifacts[0].id, "rec_1");
        assert_eq!(manifest.artifacts[1].id, "tx_1");
        assert_eq!(
            manifest.manifest_hash,
            compute_manifest_hash(&manifest).unwrap(),
            "stored hash must reproduce from canonical content"
        );
        assert!(manifest.superseded_by.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_input_fails_closed() {
        let registry = InMemoryRegistry::new();
        let original = registry.put("rec_1", b"audio".to_vec());
        registry.tamper("rec_1", b"audio (corrupted in storage)".to_vec());

        let err = build_manifest(
            &registry,
            input(vec![ArtifactRef::new(
                ArtifactKind::Recording,
                "rec_1",
                original,
            )]),
        )
        .await
        .unwrap_err();

        assert!(err.is_input_integrity(), "got {err}");
    }

    #[tokio::test]
    async fn test_unknown_artifact_fails_closed() {
        let registry = InMemoryRegistry::new();
        let err = build_manifest(
            &registry,
            input(vec![ArtifactRef::new(
                ArtifactKind::Score,
                "missing",
                "sha256:00",
            )]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::Registry(_)));
    }

    #[tokio::test]
    async fn test_empty_manifest_is_refused() {
        let registry = InMemoryRegistry::new();
        let err = build_manifest(&registry, input(vec![])).await.unwrap_err();
        assert!(matches!(err, LedgerError::EmptyManifest { .. }));
    }
}
