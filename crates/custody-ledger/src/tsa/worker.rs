//! Background TSA attachment worker.
//!
//! Bundle creation enqueues a job and moves on; this worker owns all TSA
//! network I/O. A job that fails (outage, rejection, exhausted retries)
//! leaves the bundle `pending` — the recovery sweep is the safety net, so
//! nothing here ever needs to be durable or exactly-once.

use crate::store::LedgerStore;
use crate::tsa::{TsaClient, TsaError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Request to attach a timestamp to one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsaJob {
    pub bundle_id: Uuid,
}

/// Spawn the attachment worker. Dropping all senders stops it.
pub fn spawn_tsa_worker(
    store: LedgerStore,
    client: TsaClient,
    mut jobs: mpsc::Receiver<TsaJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            match attach_timestamp(&store, &client, job.bundle_id).await {
                Ok(true) => info!(bundle_id = %job.bundle_id, "tsa token attached"),
                Ok(false) => debug!(bundle_id = %job.bundle_id, "bundle already attested, skipping"),
                Err(e) => warn!(
                    bundle_id = %job.bundle_id,
                    error = %e,
                    "tsa attachment failed, bundle stays pending for recovery"
                ),
            }
        }
        debug!("tsa worker channel closed, shutting down");
    })
}

/// Submit one bundle's hash and perform the one-way attachment.
///
/// Returns `Ok(false)` when the bundle already carries a token — jobs may be
/// enqueued more than once (creation + recovery) and the transition is
/// monotonic, so repeats are a no-op, never an overwrite.
pub(crate) async fn attach_timestamp(
    store: &LedgerStore,
    client: &TsaClient,
    bundle_id: Uuid,
) -> Result<bool, AttachError> {
    let bundle = store.get_bundle(bundle_id)?;
    if bundle.tsa.is_attached() {
        return Ok(false);
    }

    let attachment = client.timestamp(&bundle.bundle_hash).await?;
    store.attach_tsa(bundle_id, &attachment)?;
    Ok(true)
}

/// Failure of a single attachment attempt.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error(transparent)]
    Tsa(#[from] TsaError),
}

impl AttachError {
    /// Transient failures leave the bundle pending and are retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Tsa(e) if e.is_retryable())
    }
}
