//! Independent verification.
//!
//! Verification trusts nothing stored: the manifest hash is recomputed from
//! the manifest's canonical content, artifact digests are re-read live, and
//! the bundle hash is recomputed over those RECOMPUTED values. Tampering with
//! an artifact therefore flips both its own check and the bundle hash check,
//! while the manifest record itself still verifies. Mismatches are findings
//! in the report, never errors.

use crate::crypto::{compute_bundle_hash, compute_manifest_hash, sha256_hex};
use crate::error::LedgerError;
use crate::registry::{ArtifactRegistry, RegistryError};
use crate::store::LedgerStore;
use crate::tsa::extract_tst_info;
use crate::types::{ArtifactKind, ArtifactRef, Bundle, BundleExport};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Outcome of re-deriving one artifact's digest.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactCheck {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub artifact_id: String,
    /// Digest frozen in the bundle
    pub expected_sha256: String,
    /// Digest of the artifact's current bytes; `None` when verifying offline
    /// or when the artifact is gone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_sha256: Option<String>,
    /// `None` when no registry was available to re-read the artifact
    pub matched: Option<bool>,
}

/// Full verification report for one bundle.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub bundle_id: Uuid,
    /// Manifest hash reproduces from the manifest's canonical content
    pub manifest_hash_match: bool,
    /// Bundle hash reproduces from recomputed inputs
    pub bundle_hash_match: bool,
    /// TSA token checks out; `None` when no token is attached
    pub tsa_valid: Option<bool>,
    pub per_artifact: Vec<ArtifactCheck>,
}

impl VerifyReport {
    /// True when nothing failed. Checks that could not run (offline artifact
    /// reads, absent TSA token) do not count as failures.
    pub fn is_fully_verified(&self) -> bool {
        self.manifest_hash_match
            && self.bundle_hash_match
            && self.tsa_valid != Some(false)
            && self.per_artifact.iter().all(|a| a.matched != Some(false))
    }
}

/// Verifier bound to a store and a live artifact registry.
pub struct Verifier<'a> {
    store: &'a LedgerStore,
    registry: &'a dyn ArtifactRegistry,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a LedgerStore, registry: &'a dyn ArtifactRegistry) -> Self {
        Self { store, registry }
    }

    /// Verify a stored bundle against live artifact bytes.
    pub async fn verify_bundle(&self, bundle_id: Uuid) -> Result<VerifyReport, LedgerError> {
        let export = self.store.export_bundle(bundle_id)?;
        verify_export(&export, Some(self.registry)).await
    }
}

/// Verify a self-contained export.
///
/// With no registry the artifact checks are skipped and the report covers
/// internal consistency only: hash recomputation and the TSA token. This is
/// the third-party path; it needs no store and no ledger code beyond the
/// canonicalization rules.
pub async fn verify_export(
    export: &BundleExport,
    registry: Option<&dyn ArtifactRegistry>,
) -> Result<VerifyReport, LedgerError> {
    let recomputed_manifest_hash = compute_manifest_hash(&export.manifest)?;
    let manifest_hash_match = recomputed_manifest_hash == export.manifest.manifest_hash;

    let mut per_artifact = Vec::with_capacity(export.bundle.artifact_hashes.len());
    for artifact in &export.bundle.artifact_hashes {
        per_artifact.push(check_artifact(artifact, registry).await?);
    }

    // Recompute the bundle hash from what was just re-derived, not from the
    // stored copies. Offline, stored digests stand in for live ones.
    let mut shadow = export.bundle.clone();
    shadow.manifest_hash = recomputed_manifest_hash;
    shadow.artifact_hashes = export
        .bundle
        .artifact_hashes
        .iter()
        .zip(&per_artifact)
        .map(|(stored, check)| ArtifactRef {
            kind: stored.kind,
            id: stored.id.clone(),
            sha256: check
                .live_sha256
                .clone()
                .unwrap_or_else(|| stored.sha256.clone()),
        })
        .collect();
    let bundle_hash_match = compute_bundle_hash(&shadow)? == export.bundle.bundle_hash;

    let tsa_valid = export
        .bundle
        .tsa
        .is_attached()
        .then(|| check_tsa_token(&export.bundle));

    let report = VerifyReport {
        bundle_id: export.bundle.id,
        manifest_hash_match,
        bundle_hash_match,
        tsa_valid,
        per_artifact,
    };
    debug!(
        bundle_id = %report.bundle_id,
        verified = report.is_fully_verified(),
        "bundle verification complete"
    );
    Ok(report)
}

async fn check_artifact(
    artifact: &ArtifactRef,
    registry: Option<&dyn ArtifactRegistry>,
) -> Result<ArtifactCheck, LedgerError> {
    let live_sha256 = match registry {
        None => None,
        Some(registry) => match registry.live_digest(&artifact.id).await {
            Ok(digest) => Some(digest),
            // A vanished artifact is a verification finding, not an error
            Err(RegistryError::NotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        },
    };
    let matched = match (&registry, &live_sha256) {
        (None, _) => None,
        (Some(_), Some(live)) => Some(*live == artifact.sha256),
        (Some(_), None) => Some(false),
    };
    Ok(ArtifactCheck {
        kind: artifact.kind,
        artifact_id: artifact.id.clone(),
        expected_sha256: artifact.sha256.clone(),
        live_sha256,
        matched,
    })
}

/// Check the attached token against the bundle without touching the network:
/// stored base64 must hash to the stored token digest, parse as a timestamp
/// token, and imprint exactly the bundle hash it claims to attest.
fn check_tsa_token(bundle: &Bundle) -> bool {
    let Some(token_b64) = &bundle.tsa.token else {
        return false;
    };
    let Ok(raw) = BASE64.decode(token_b64.as_bytes()) else {
        return false;
    };
    if bundle.tsa.token_hash.as_deref() != Some(sha256_hex(&raw).as_str()) {
        return false;
    }
    let Ok(info) = extract_tst_info(&raw) else {
        return false;
    };
    let Some(hex_part) = bundle.bundle_hash.strip_prefix("sha256:") else {
        return false;
    };
    let Ok(expected_imprint) = hex::decode(hex_part) else {
        return false;
    };
    if info.message_imprint != expected_imprint {
        return false;
    }
    bundle.tsa.timestamp == Some(info.gen_time)
}
