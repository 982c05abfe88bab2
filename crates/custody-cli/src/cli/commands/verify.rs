use super::super::args::VerifyArgs;
use crate::exit_codes;
use crate::registry::FileRegistry;
use anyhow::Context;
use custody_ledger::registry::ArtifactRegistry;
use custody_ledger::types::BundleExport;
use custody_ledger::verify::{verify_export, Verifier};
use custody_ledger::LedgerStore;
use std::path::Path;

pub async fn run(args: VerifyArgs, db: &Path) -> anyhow::Result<i32> {
    let mut registry = FileRegistry::new();
    for mapping in &args.artifacts {
        registry.add(&mapping.id, &mapping.path);
    }

    let report = if let Some(path) = &args.export {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read export: {}", path.display()))?;
        let export: BundleExport =
            serde_json::from_slice(&bytes).context("export is not a valid bundle export")?;
        let live: Option<&dyn ArtifactRegistry> = if registry.is_empty() {
            None
        } else {
            Some(&registry)
        };
        verify_export(&export, live).await?
    } else {
        let bundle_id = args.bundle_id.context("bundle id required")?;
        anyhow::ensure!(
            !registry.is_empty(),
            "provide --artifact ID=PATH mappings to check artifact bytes, \
             or verify an exported bundle with --export"
        );
        let store = LedgerStore::open(db)?;
        Verifier::new(&store, &registry)
            .verify_bundle(bundle_id)
            .await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_fully_verified() {
        eprintln!("verify: OK");
        Ok(exit_codes::SUCCESS)
    } else {
        eprintln!("verify: FAILED");
        Ok(exit_codes::VERIFICATION_FAILED)
    }
}
