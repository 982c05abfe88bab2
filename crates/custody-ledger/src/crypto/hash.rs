//! Record hash binding: SHA-256 over canonical bytes.
//!
//! # Security Invariants
//!
//! 1. `manifest_hash` covers every manifest field EXCEPT itself and the
//!    (later-written) `superseded_by` pointer.
//! 2. `bundle_hash` covers every bundle field EXCEPT itself and the `tsa`
//!    sub-record, so attaching a timestamp can never change the hash it
//!    attests to.
//! 3. Hash inputs are JCS (RFC 8785) canonical JSON.
//! 4. All digests are SHA-256, hex, with a `sha256:` prefix.
//!
//! Exclusion is by construction: the input structs below simply do not carry
//! the excluded fields, so no code path can accidentally include them.

use crate::crypto::jcs::{self, CanonicalizationError};
use crate::types::{ArtifactRef, Bundle, Manifest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of raw bytes, `sha256:<hex>`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Exact hash input for a manifest.
///
/// Deliberately EXCLUDES `manifest_hash` (self-referential) and
/// `superseded_by` (the one field written after creation — including it would
/// break the "old version stays byte-identical" property).
#[derive(Serialize)]
struct ManifestHashInput<'a> {
    id: &'a Uuid,
    version: u32,
    organization_id: &'a str,
    call_id: &'a str,
    artifacts: &'a [ArtifactRef],
    created_at: &'a DateTime<Utc>,
    created_by: &'a str,
}

/// Exact hash input for a bundle.
///
/// Deliberately EXCLUDES `bundle_hash` (self-referential) and `tsa` (written
/// after creation). INCLUDES `immutable_storage` so the frozen-at-creation
/// claim is itself covered by the hash.
#[derive(Serialize)]
struct BundleHashInput<'a> {
    id: &'a Uuid,
    version: u32,
    organization_id: &'a str,
    call_id: &'a str,
    manifest_id: &'a Uuid,
    manifest_hash: &'a str,
    artifact_hashes: &'a [ArtifactRef],
    immutable_storage: bool,
    created_at: &'a DateTime<Utc>,
    created_by: &'a str,
}

/// Recompute a manifest's hash over its own canonical content.
///
/// Used both at build time (to populate `manifest_hash`) and at verification
/// time (to check it). The stored hash is never an input here.
pub fn compute_manifest_hash(manifest: &Manifest) -> Result<String, CanonicalizationError> {
    let input = ManifestHashInput {
        id: &manifest.id,
        version: manifest.version,
        organization_id: &manifest.organization_id,
        call_id: &manifest.call_id,
        artifacts: &manifest.artifacts,
        created_at: &manifest.created_at,
        created_by: &manifest.created_by,
    };
    Ok(sha256_hex(&jcs::to_vec(&input)?))
}

/// Recompute a bundle's hash over its own canonical content.
///
/// `manifest_hash` and `artifact_hashes` are taken from the caller-supplied
/// bundle value; the verifier feeds recomputed values through here rather
/// than trusting stored ones.
pub fn compute_bundle_hash(bundle: &Bundle) -> Result<String, CanonicalizationError> {
    let input = BundleHashInput {
        id: &bundle.id,
        version: bundle.version,
        organization_id: &bundle.organization_id,
        call_id: &bundle.call_id,
        manifest_id: &bundle.manifest_id,
        manifest_hash: &bundle.manifest_hash,
        artifact_hashes: &bundle.artifact_hashes,
        immutable_storage: bundle.immutable_storage,
        created_at: &bundle.created_at,
        created_by: &bundle.created_by,
    };
    Ok(sha256_hex(&jcs::to_vec(&input)?))
}
