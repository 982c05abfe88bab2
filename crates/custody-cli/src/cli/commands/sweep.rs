use super::super::args::SweepArgs;
use crate::exit_codes;
use custody_ledger::recovery::{RecoveryConfig, RecoveryJob};
use custody_ledger::tsa::{TsaClient, TsaConfig};
use custody_ledger::LedgerStore;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

pub async fn run(args: SweepArgs, db: &Path) -> anyhow::Result<i32> {
    let store = LedgerStore::open(db)?;
    let client = TsaClient::new(TsaConfig {
        url: args.tsa_url.clone(),
        ..TsaConfig::default()
    })?;
    let job = RecoveryJob::new(
        store,
        client,
        RecoveryConfig {
            bundle_grace: Duration::from_secs(args.grace_secs),
            tsa_retry_window: Duration::from_secs(args.retry_secs),
            ..RecoveryConfig::default()
        },
    );

    let report = job.run_once().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "bundles_built": report.bundles_built,
            "tokens_attached": report.tokens_attached,
            "still_pending": report.still_pending,
        }))?
    );
    Ok(exit_codes::SUCCESS)
}
