use super::super::args::SealArgs;
use crate::exit_codes;
use crate::registry::FileRegistry;
use anyhow::Context;
use custody_ledger::registry::ArtifactRegistry;
use custody_ledger::tsa::worker::spawn_tsa_worker;
use custody_ledger::tsa::{TsaClient, TsaConfig};
use custody_ledger::types::ArtifactRef;
use custody_ledger::{CustodyLedger, LedgerStore, SealRequest};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn run(args: SealArgs, db: &Path) -> anyhow::Result<i32> {
    let mut registry = FileRegistry::new();
    for spec in &args.artifacts {
        registry.add(&spec.id, &spec.path);
    }
    let registry = Arc::new(registry);

    // Hash the files up front; sealing reconfirms these digests and fails
    // closed on any divergence
    let mut artifacts = Vec::with_capacity(args.artifacts.len());
    for spec in &args.artifacts {
        let digest = registry
            .live_digest(&spec.id)
            .await
            .with_context(|| format!("failed to hash artifact '{}'", spec.id))?;
        artifacts.push(ArtifactRef::new(spec.kind, spec.id.clone(), digest));
    }

    let store = LedgerStore::open(db)?;
    let mut ledger = CustodyLedger::new(store.clone(), registry);
    let mut worker = None;
    if let Some(url) = &args.tsa_url {
        let client = TsaClient::new(TsaConfig {
            url: Some(url.clone()),
            ..TsaConfig::default()
        })?;
        let (tx, rx) = mpsc::channel(16);
        worker = Some(spawn_tsa_worker(store.clone(), client, rx));
        ledger = ledger.with_tsa_queue(tx);
    }

    let outcome = ledger
        .seal_call(SealRequest {
            organization_id: args.org,
            call_id: args.call,
            artifacts,
            created_by: args.actor,
        })
        .await?;

    // One-shot process: drop the queue sender and let the worker drain so the
    // timestamp attempt happens before exit. Failure still leaves a valid
    // pending bundle for a later sweep.
    drop(ledger);
    if let Some(handle) = worker {
        handle.await.context("tsa worker panicked")?;
    }

    let bundle = store.get_bundle(outcome.bundle.id)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "call_id": outcome.manifest.call_id,
            "version": outcome.manifest.version,
            "manifest_id": outcome.manifest.id,
            "manifest_hash": outcome.manifest.manifest_hash,
            "bundle_id": bundle.id,
            "bundle_hash": bundle.bundle_hash,
            "tsa_status": bundle.tsa.status.to_string(),
        }))?
    );
    Ok(exit_codes::SUCCESS)
}
