use super::super::args::ShowArgs;
use crate::exit_codes;
use custody_ledger::LedgerStore;
use serde_json::json;
use std::path::Path;

pub fn run(args: ShowArgs, db: &Path) -> anyhow::Result<i32> {
    let store = LedgerStore::open(db)?;
    let manifests = store.manifests_for_call(&args.call)?;
    let bundles = store.bundles_for_call(&args.call)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "call_id": args.call,
            "manifests": manifests,
            "bundles": bundles,
        }))?
    );
    Ok(exit_codes::SUCCESS)
}
