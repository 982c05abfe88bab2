use super::super::args::ExportArgs;
use crate::exit_codes;
use anyhow::Context;
use custody_ledger::LedgerStore;
use std::path::Path;

pub fn run(args: ExportArgs, db: &Path) -> anyhow::Result<i32> {
    let store = LedgerStore::open(db)?;
    let export = store.export_bundle(args.bundle_id)?;
    let body = serde_json::to_string_pretty(&export)?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("failed to write export: {}", path.display()))?;
            eprintln!("exported bundle {} to {}", args.bundle_id, path.display());
        }
        None => println!("{body}"),
    }
    Ok(exit_codes::SUCCESS)
}
