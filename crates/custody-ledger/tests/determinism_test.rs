//! Hash determinism across construction, serialization, and persistence.
//!
//! The whole custody claim rests on one property: anyone, at any later time,
//! can recompute every hash from the record's canonical content and get the
//! same answer. These tests pin that property end to end, including a golden
//! vector computed outside this codebase.

use custody_ledger::crypto::{compute_bundle_hash, compute_manifest_hash};
use custody_ledger::manifest::{build_manifest, ManifestInput};
use custody_ledger::registry::InMemoryRegistry;
use custody_ledger::types::{ArtifactKind, ArtifactRef, Manifest};
use custody_ledger::{build_bundle, LedgerStore};
use chrono::TimeZone;
use uuid::Uuid;

fn golden_manifest() -> Manifest {
    Manifest {
        id: Uuid::parse_str("018e8c3a-0000-7000-8000-5a2f90c0a1b3").unwrap(),
        version: 1,
        organization_id: "org_acme".into(),
        call_id: "call_7f3d".into(),
        artifacts: vec![
            ArtifactRef::new(
                ArtifactKind::Recording,
                "rec_01",
                "sha256:7d865e959b2466918c9863afca942d0fb89d7c9ac0c99bafc3749504ded97730",
            ),
            ArtifactRef::new(
                ArtifactKind::Transcript,
                "tx_01",
                "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae",
            ),
        ],
        manifest_hash: String::new(),
        created_at: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        created_by: "svc_finalizer".into(),
        superseded_by: None,
    }
}

/// Golden vector computed independently (Python hashlib over the identical
/// RFC 8785 canonical string). A change here means the wire format moved and
/// every existing record would stop verifying.
#[test]
fn test_golden_vector_pins_the_canonical_format() {
    let hash = compute_manifest_hash(&golden_manifest()).unwrap();
    assert_eq!(
        hash,
        "sha256:4dc36b7eba477f69e99ada89dfa06c543afdfb302b9e032933b6fce4a473dd0f"
    );
}

/// Timestamps serialize as RFC 3339 UTC with a `Z` suffix; anything else
/// would silently change every hash.
#[test]
fn test_timestamp_wire_format() {
    let json = serde_json::to_value(&golden_manifest()).unwrap();
    assert_eq!(json["created_at"], "2024-03-01T12:00:00Z");
}

/// A record that travels through the store must rehash to the value computed
/// at build time. Sub-second timestamp precision in particular has to survive
/// the round trip.
#[tokio::test]
async fn test_hashes_survive_persistence_roundtrip() {
    let registry = InMemoryRegistry::new();
    let digest = registry.put("rec_1", b"audio".to_vec());
    let manifest = build_manifest(
        &registry,
        ManifestInput {
            organization_id: "org_acme".into(),
            call_id: "call_rt".into(),
            version: 1,
            artifacts: vec![ArtifactRef::new(ArtifactKind::Recording, "rec_1", digest)],
            created_by: "svc_finalizer".into(),
        },
    )
    .await
    .unwrap();
    let bundle = build_bundle(&manifest, true, "svc_finalizer").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let store = LedgerStore::open(&path).unwrap();
        store.insert_manifest(&manifest).unwrap();
        store.insert_bundle(&bundle).unwrap();
    }

    // Fresh process, fresh connection: recomputation must still agree
    let store = LedgerStore::open(&path).unwrap();
    let loaded_manifest = store.get_manifest(manifest.id).unwrap();
    let loaded_bundle = store.get_bundle(bundle.id).unwrap();

    assert_eq!(loaded_manifest, manifest);
    assert_eq!(loaded_bundle, bundle);
    assert_eq!(
        compute_manifest_hash(&loaded_manifest).unwrap(),
        manifest.manifest_hash
    );
    assert_eq!(
        compute_bundle_hash(&loaded_bundle).unwrap(),
        bundle.bundle_hash
    );
}
