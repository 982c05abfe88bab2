//! Custody ledger facade: the one write path for sealing calls.
//!
//! `seal_call` runs Manifest Builder and Bundle Builder as one logical
//! operation per call, then hands TSA attachment to the background queue.
//! No cross-call locking exists anywhere: records are only ever inserted,
//! and the single race — two builders claiming the same `(call_id, version)`
//! — is arbitrated by the store's uniqueness constraint with a bounded
//! caller-side retry.

use crate::bundle::build_bundle;
use crate::error::LedgerError;
use crate::manifest::{build_manifest, ManifestInput};
use crate::registry::ArtifactRegistry;
use crate::store::LedgerStore;
use crate::tsa::worker::TsaJob;
use crate::types::{ArtifactRef, Bundle, Manifest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Attempts before giving up on the "insert next version" race.
const VERSION_RACE_ATTEMPTS: u32 = 3;

/// Request to seal one finalized call.
#[derive(Debug, Clone)]
pub struct SealRequest {
    pub organization_id: String,
    pub call_id: String,
    /// Ordered artifact descriptors from the producing services
    pub artifacts: Vec<ArtifactRef>,
    /// Triggering actor
    pub created_by: String,
}

/// Result of a successful seal: both records are persisted and frozen.
#[derive(Debug, Clone)]
pub struct SealOutcome {
    pub manifest: Manifest,
    pub bundle: Bundle,
}

/// The custody ledger service.
pub struct CustodyLedger {
    store: LedgerStore,
    registry: Arc<dyn ArtifactRegistry>,
    /// Present iff a TSA endpoint is configured; bundles start `pending`
    /// when it is, `not_configured` otherwise.
    tsa_queue: Option<mpsc::Sender<TsaJob>>,
}

impl CustodyLedger {
    pub fn new(store: LedgerStore, registry: Arc<dyn ArtifactRegistry>) -> Self {
        Self {
            store,
            registry,
            tsa_queue: None,
        }
    }

    /// Wire the background TSA attachment queue.
    pub fn with_tsa_queue(mut self, queue: mpsc::Sender<TsaJob>) -> Self {
        self.tsa_queue = Some(queue);
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Seal a call's finalized artifacts into a new manifest version and its
    /// bundle.
    ///
    /// Fails closed before writing anything if an artifact hash cannot be
    /// reconfirmed. If the bundle insert fails after the manifest landed, the
    /// manifest is left bundle-less — the recovery sweep's normal input, not
    /// a state to roll back (the store would refuse a rollback anyway).
    /// TSA submission is enqueued fire-and-forget; it never blocks sealing.
    pub async fn seal_call(&self, request: SealRequest) -> Result<SealOutcome, LedgerError> {
        let manifest = self.insert_next_version(&request).await?;

        let bundle = build_bundle(&manifest, self.tsa_queue.is_some(), &request.created_by)?;
        self.store.insert_bundle(&bundle)?;

        if let Some(queue) = &self.tsa_queue {
            if let Err(e) = queue.try_send(TsaJob {
                bundle_id: bundle.id,
            }) {
                warn!(
                    bundle_id = %bundle.id,
                    error = %e,
                    "tsa queue unavailable, recovery sweep will pick the bundle up"
                );
            }
        }

        info!(
            call_id = %request.call_id,
            manifest_id = %manifest.id,
            bundle_id = %bundle.id,
            version = manifest.version,
            "call sealed"
        );
        Ok(SealOutcome { manifest, bundle })
    }

    async fn insert_next_version(&self, request: &SealRequest) -> Result<Manifest, LedgerError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let version = self.store.next_version(&request.call_id)?;
            let prior = self.store.latest_manifest(&request.call_id)?;

            let manifest = build_manifest(
                self.registry.as_ref(),
                ManifestInput {
                    organization_id: request.organization_id.clone(),
                    call_id: request.call_id.clone(),
                    version,
                    artifacts: request.artifacts.clone(),
                    created_by: request.created_by.clone(),
                },
            )
            .await?;

            match self.store.insert_manifest(&manifest) {
                Ok(()) => {
                    if let Some(prior) = prior {
                        self.supersede(&prior, &manifest);
                    }
                    return Ok(manifest);
                }
                Err(e) if e.is_version_conflict() && attempts < VERSION_RACE_ATTEMPTS => {
                    warn!(
                        call_id = %request.call_id,
                        version,
                        attempt = attempts,
                        "lost manifest version race, retrying with next version"
                    );
                }
                Err(e) if e.is_version_conflict() => {
                    return Err(LedgerError::VersionRaceExhausted {
                        call_id: request.call_id.clone(),
                        attempts,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Aim the prior manifest's one-time pointer at the new version.
    ///
    /// A concurrent sealer may have aimed it already; the store rejects the
    /// second write and custody continuity is preserved by whoever won, so
    /// that outcome is logged, not propagated.
    fn supersede(&self, prior: &Manifest, successor: &Manifest) {
        match self.store.set_superseded_by(prior.id, successor.id) {
            Ok(()) => {}
            Err(e) if e.is_immutability_violation() => {
                warn!(
                    manifest_id = %prior.id,
                    "supersession pointer already set by a concurrent sealer"
                );
            }
            Err(e) => {
                warn!(
                    manifest_id = %prior.id,
                    error = %e,
                    "failed to set supersession pointer"
                );
            }
        }
    }
}
