//! Recovery sweep.
//!
//! Two holes can appear in the ledger during normal operation: a manifest
//! whose bundle insert failed, and a bundle whose TSA submission never
//! completed. The sweep closes both. Every step is idempotent against the
//! store's constraints, so overlapping sweeps and re-runs are harmless.

use crate::bundle::build_bundle;
use crate::error::LedgerError;
use crate::store::LedgerStore;
use crate::tsa::worker::attach_timestamp;
use crate::tsa::TsaClient;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sweep cadence and age thresholds.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Delay between sweeps in the long-running loop
    pub interval: Duration,
    /// A manifest must be at least this old before its missing bundle is
    /// treated as a failure rather than a write in flight
    pub bundle_grace: Duration,
    /// A pending bundle must be at least this old before the sweep resubmits
    /// it, keeping the sweep out of the live worker's way
    pub tsa_retry_window: Duration,
    /// Actor recorded on bundles the sweep builds
    pub actor: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            bundle_grace: Duration::from_secs(120),
            tsa_retry_window: Duration::from_secs(600),
            actor: "custody-recovery".to_string(),
        }
    }
}

/// What one sweep accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Bundles built for manifests that had none
    pub bundles_built: usize,
    /// TSA tokens attached to waiting bundles
    pub tokens_attached: usize,
    /// Bundles still awaiting attestation after this sweep
    pub still_pending: usize,
}

/// The periodic recovery job.
pub struct RecoveryJob {
    store: LedgerStore,
    client: TsaClient,
    config: RecoveryConfig,
}

impl RecoveryJob {
    pub fn new(store: LedgerStore, client: TsaClient, config: RecoveryConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Run sweeps forever at the configured interval.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) => {
                    if report == SweepReport::default() {
                        debug!("recovery sweep found nothing to do");
                    } else {
                        info!(
                            bundles_built = report.bundles_built,
                            tokens_attached = report.tokens_attached,
                            still_pending = report.still_pending,
                            "recovery sweep complete"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "recovery sweep failed"),
            }
        }
    }

    /// One full sweep: bundle the bundle-less manifests, then resubmit
    /// waiting bundles to the TSA.
    pub async fn run_once(&self) -> Result<SweepReport, LedgerError> {
        let mut report = SweepReport::default();
        self.sweep_missing_bundles(&mut report)?;
        self.sweep_awaiting_tsa(&mut report).await?;
        Ok(report)
    }

    fn sweep_missing_bundles(&self, report: &mut SweepReport) -> Result<(), LedgerError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.bundle_grace).unwrap_or(chrono::Duration::zero());
        for manifest in self.store.manifests_without_bundle(cutoff)? {
            let bundle = build_bundle(&manifest, self.client.is_configured(), &self.config.actor)?;
            match self.store.insert_bundle(&bundle) {
                Ok(()) => {
                    info!(
                        manifest_id = %manifest.id,
                        bundle_id = %bundle.id,
                        call_id = %manifest.call_id,
                        "recovered missing bundle"
                    );
                    report.bundles_built += 1;
                }
                // A concurrent writer got there first; their bundle stands
                Err(e) if e.is_bundle_exists() => {
                    debug!(manifest_id = %manifest.id, "bundle appeared concurrently, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn sweep_awaiting_tsa(&self, report: &mut SweepReport) -> Result<(), LedgerError> {
        if !self.client.is_configured() {
            return Ok(());
        }
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.tsa_retry_window).unwrap_or(chrono::Duration::zero());
        // not_configured bundles are included: the endpoint exists now, and
        // the not_configured → attached transition is permitted
        for bundle in self.store.bundles_awaiting_tsa(cutoff, true)? {
            match attach_timestamp(&self.store, &self.client, bundle.id).await {
                Ok(true) => report.tokens_attached += 1,
                Ok(false) => {}
                Err(e) => {
                    report.still_pending += 1;
                    warn!(
                        bundle_id = %bundle.id,
                        transient = e.is_transient(),
                        error = %e,
                        "tsa attachment still failing, left for next sweep"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{compute_manifest_hash, sha256_hex};
    use crate::tsa::TsaConfig;
    use crate::types::{ArtifactKind, ArtifactRef, Manifest, TsaStatus};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed_manifest(store: &LedgerStore, call_id: &str) -> Manifest {
        let mut manifest = Manifest {
            id: Uuid::now_v7(),
            version: 1,
            organization_id: "org_test".into(),
            call_id: call_id.into(),
            artifacts: vec![ArtifactRef::new(
                ArtifactKind::Recording,
                "rec_1",
                sha256_hex(b"audio"),
            )],
            manifest_hash: String::new(),
            created_at: Utc::now(),
            created_by: "svc_finalizer".into(),
            superseded_by: None,
        };
        manifest.manifest_hash = compute_manifest_hash(&manifest).unwrap();
        store.insert_manifest(&manifest).unwrap();
        manifest
    }

    fn immediate_config() -> RecoveryConfig {
        RecoveryConfig {
            bundle_grace: Duration::ZERO,
            tsa_retry_window: Duration::ZERO,
            ..RecoveryConfig::default()
        }
    }

    fn unconfigured_client() -> TsaClient {
        TsaClient::new(TsaConfig::default()).unwrap()
    }

    fn client_for(url: &str) -> TsaClient {
        TsaClient::new(TsaConfig {
            url: Some(url.to_string()),
            timeout: Duration::from_secs(2),
            max_retries: 0,
            max_backoff: Duration::from_millis(10),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_builds_missing_bundles_idempotently() {
        let store = LedgerStore::memory().unwrap();
        let manifest = seed_manifest(&store, "call_r1");
        let job = RecoveryJob::new(store.clone(), unconfigured_client(), immediate_config());

        let report = job.run_once().await.unwrap();
        assert_eq!(report.bundles_built, 1);

        let bundle = store.bundle_for_manifest(manifest.id).unwrap().unwrap();
        assert_eq!(bundle.manifest_hash, manifest.manifest_hash);
        assert_eq!(bundle.tsa.status, TsaStatus::NotConfigured);

        // Second sweep finds nothing and duplicates nothing
        let report = job.run_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(store.bundles_for_call("call_r1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grace_period_shields_writes_in_flight() {
        let store = LedgerStore::memory().unwrap();
        seed_manifest(&store, "call_r1");
        let config = RecoveryConfig {
            bundle_grace: Duration::from_secs(3600),
            ..immediate_config()
        };
        let job = RecoveryJob::new(store.clone(), unconfigured_client(), config);

        let report = job.run_once().await.unwrap();
        assert_eq!(report.bundles_built, 0);
        assert!(store.bundles_for_call("call_r1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_attaches_token_after_outage() {
        let store = LedgerStore::memory().unwrap();
        let manifest = seed_manifest(&store, "call_r1");

        // Outage: the sweep builds the bundle but cannot attest it
        let down = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;
        let job = RecoveryJob::new(store.clone(), client_for(&down.uri()), immediate_config());
        let report = job.run_once().await.unwrap();
        assert_eq!(report.bundles_built, 1);
        assert_eq!(report.still_pending, 1);

        let bundle = store.bundle_for_manifest(manifest.id).unwrap().unwrap();
        assert_eq!(bundle.tsa.status, TsaStatus::Pending);

        // TSA back up: the next sweep completes attestation without touching
        // the bundle hash
        let mut imprint = [0u8; 32];
        imprint.copy_from_slice(
            &hex::decode(bundle.bundle_hash.strip_prefix("sha256:").unwrap()).unwrap(),
        );
        let gen_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let up = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(crate::tsa::testutil::granted_response(&imprint, 9, gen_time)),
            )
            .mount(&up)
            .await;
        let job = RecoveryJob::new(store.clone(), client_for(&up.uri()), immediate_config());
        let report = job.run_once().await.unwrap();
        assert_eq!(report.tokens_attached, 1);
        assert_eq!(report.still_pending, 0);

        let attested = store.bundle_for_manifest(manifest.id).unwrap().unwrap();
        assert_eq!(attested.tsa.status, TsaStatus::Attached);
        assert_eq!(attested.bundle_hash, bundle.bundle_hash);
    }

    #[tokio::test]
    async fn test_newly_configured_tsa_completes_not_configured_bundles() {
        let store = LedgerStore::memory().unwrap();
        let manifest = seed_manifest(&store, "call_r1");

        // First sweep runs with no endpoint at all
        let job = RecoveryJob::new(store.clone(), unconfigured_client(), immediate_config());
        job.run_once().await.unwrap();
        let bundle = store.bundle_for_manifest(manifest.id).unwrap().unwrap();
        assert_eq!(bundle.tsa.status, TsaStatus::NotConfigured);

        // Endpoint configured later: the sweep upgrades the record
        let mut imprint = [0u8; 32];
        imprint.copy_from_slice(
            &hex::decode(bundle.bundle_hash.strip_prefix("sha256:").unwrap()).unwrap(),
        );
        let gen_time = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(crate::tsa::testutil::granted_response(&imprint, 11, gen_time)),
            )
            .mount(&server)
            .await;
        let job = RecoveryJob::new(store.clone(), client_for(&server.uri()), immediate_config());
        let report = job.run_once().await.unwrap();
        assert_eq!(report.tokens_attached, 1);

        let attested = store.bundle_for_manifest(manifest.id).unwrap().unwrap();
        assert_eq!(attested.tsa.status, TsaStatus::Attached);
    }
}
