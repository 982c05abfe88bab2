//! Verification against tampering, end to end.
//!
//! The scenario that matters: artifacts live outside the ledger, so an
//! attacker with storage access can swap bytes there. Verification has to
//! localize that — the swapped artifact fails, the untouched ones pass, and
//! the ledger records themselves still prove they were not rewritten.

use custody_ledger::registry::InMemoryRegistry;
use custody_ledger::types::{ArtifactKind, ArtifactRef};
use custody_ledger::verify::{verify_export, Verifier};
use custody_ledger::{CustodyLedger, LedgerStore, SealOutcome, SealRequest};
use std::sync::Arc;

async fn sealed(registry: &InMemoryRegistry) -> (LedgerStore, SealOutcome) {
    let rec = registry.put("rec_01", b"final recording".to_vec());
    let tx = registry.put("tx_01", b"final transcript".to_vec());
    let store = LedgerStore::memory().unwrap();
    let ledger = CustodyLedger::new(store.clone(), Arc::new(registry.clone()));
    let outcome = ledger
        .seal_call(SealRequest {
            organization_id: "org_acme".into(),
            call_id: "call_vt".into(),
            artifacts: vec![
                ArtifactRef::new(ArtifactKind::Recording, "rec_01", rec),
                ArtifactRef::new(ArtifactKind::Transcript, "tx_01", tx),
            ],
            created_by: "svc_finalizer".into(),
        })
        .await
        .unwrap();
    (store, outcome)
}

#[tokio::test]
async fn test_swapped_artifact_is_localized() {
    let registry = InMemoryRegistry::new();
    let (store, outcome) = sealed(&registry).await;

    registry.tamper("tx_01", b"transcript with the complaint removed".to_vec());

    let report = Verifier::new(&store, &registry)
        .verify_bundle(outcome.bundle.id)
        .await
        .unwrap();

    // Ledger records were not rewritten
    assert!(report.manifest_hash_match);
    // The swapped transcript fails; the recording still passes
    assert_eq!(report.per_artifact[0].artifact_id, "rec_01");
    assert_eq!(report.per_artifact[0].matched, Some(true));
    assert_eq!(report.per_artifact[1].artifact_id, "tx_01");
    assert_eq!(report.per_artifact[1].matched, Some(false));
    // And the recomputed bundle hash moves with the live bytes
    assert!(!report.bundle_hash_match);
    assert!(!report.is_fully_verified());
}

#[tokio::test]
async fn test_export_roundtrips_through_json_and_verifies_offline() {
    let registry = InMemoryRegistry::new();
    let (store, outcome) = sealed(&registry).await;

    let export = store.export_bundle(outcome.bundle.id).unwrap();
    let json = serde_json::to_vec(&export).unwrap();

    // A third party gets only the JSON, no store and no artifacts
    let received = serde_json::from_slice(&json).unwrap();
    let report = verify_export(&received, None).await.unwrap();
    assert!(report.manifest_hash_match);
    assert!(report.bundle_hash_match);
    assert!(report.is_fully_verified());
    assert!(report.per_artifact.iter().all(|a| a.matched.is_none()));
}

#[tokio::test]
async fn test_edited_export_is_caught_offline() {
    let registry = InMemoryRegistry::new();
    let (store, outcome) = sealed(&registry).await;

    let mut export = store.export_bundle(outcome.bundle.id).unwrap();
    // Swap one recorded artifact digest inside the exported bundle
    export.bundle.artifact_hashes[1].sha256 =
        "sha256:0000000000000000000000000000000000000000000000000000000000000000".into();

    let report = verify_export(&export, None).await.unwrap();
    assert!(report.manifest_hash_match, "manifest copy was untouched");
    assert!(!report.bundle_hash_match);
    assert!(!report.is_fully_verified());
}
