//! Bundle builder.
//!
//! A bundle freezes a manifest's hash plus every artifact hash under one
//! bundle hash, with `immutable_storage` set at creation — never a later flag
//! flip. Building is pure; persistence (and the uniqueness guarantee that one
//! manifest gets at most one bundle) lives in the store.

use crate::crypto::compute_bundle_hash;
use crate::error::LedgerError;
use crate::types::{Bundle, Manifest, TsaRecord};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// Build the bundle for one manifest version.
///
/// The TSA record starts `pending` when an endpoint is configured and
/// `not_configured` otherwise; either way the bundle hash is complete and
/// valid without a timestamp.
pub fn build_bundle(
    manifest: &Manifest,
    tsa_configured: bool,
    created_by: &str,
) -> Result<Bundle, LedgerError> {
    let tsa = if tsa_configured {
        TsaRecord::pending()
    } else {
        TsaRecord::not_configured()
    };

    let mut bundle = Bundle {
        id: Uuid::now_v7(),
        version: manifest.version,
        organization_id: manifest.organization_id.clone(),
        call_id: manifest.call_id.clone(),
        manifest_id: manifest.id,
        manifest_hash: manifest.manifest_hash.clone(),
        artifact_hashes: manifest.artifacts.clone(),
        bundle_hash: String::new(),
        immutable_storage: true,
        created_at: Utc::now(),
        created_by: created_by.to_string(),
        tsa,
    };
    bundle.bundle_hash = compute_bundle_hash(&bundle)?;

    debug!(
        bundle_id = %bundle.id,
        manifest_id = %manifest.id,
        call_id = %bundle.call_id,
        hash = %bundle.bundle_hash,
        tsa_status = %bundle.tsa.status,
        "bundle built"
    );
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{compute_manifest_hash, sha256_hex};
    use crate::types::{ArtifactKind, ArtifactRef, TsaStatus};

    fn manifest() -> Manifest {
        let mut m = Manifest {
            id: Uuid::now_v7(),
            version: 2,
            organization_id: "org_test".into(),
            call_id: "call_b1".into(),
            artifacts: vec![
                ArtifactRef::new(ArtifactKind::Recording, "rec_1", sha256_hex(b"audio")),
                ArtifactRef::new(ArtifactKind::Score, "score_1", sha256_hex(b"87")),
            ],
            manifest_hash: String::new(),
            created_at: Utc::now(),
            created_by: "svc_finalizer".into(),
            superseded_by: None,
        };
        m.manifest_hash = compute_manifest_hash(&m).unwrap();
        m
    }

    #[test]
    fn test_bundle_mirrors_manifest_and_binds_hash() {
        let m = manifest();
        let bundle = build_bundle(&m, true, "svc_finalizer").unwrap();

        assert_eq!(bundle.manifest_id, m.id);
        assert_eq!(bundle.version, m.version);
        assert_eq!(bundle.manifest_hash, m.manifest_hash);
        assert_eq!(bundle.artifact_hashes, m.artifacts);
        assert!(bundle.immutable_storage);
        assert_eq!(bundle.tsa.status, TsaStatus::Pending);
        assert_eq!(
            bundle.bundle_hash,
            compute_bundle_hash(&bundle).unwrap(),
            "stored hash must reproduce from canonical content"
        );
    }

    #[test]
    fn test_unconfigured_tsa_is_recorded_as_such() {
        let bundle = build_bundle(&manifest(), false, "svc_finalizer").unwrap();
        assert_eq!(bundle.tsa.status, TsaStatus::NotConfigured);
        assert!(bundle.tsa.token.is_none());
    }
}
