use clap::{Parser, Subcommand};
use custody_ledger::types::ArtifactKind;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "custody",
    version,
    about = "Tamper-evident custody ledger for finalized call artifacts"
)]
pub struct Cli {
    /// Ledger database path
    #[arg(long, global = true, env = "CUSTODY_DB", default_value = "custody.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Seal a call's finalized artifacts into a manifest and bundle
    Seal(SealArgs),
    /// Verify a stored bundle, or an exported bundle file offline
    Verify(VerifyArgs),
    /// Show the manifest and bundle history for a call
    Show(ShowArgs),
    /// Export a bundle with its manifest for offline verification
    Export(ExportArgs),
    /// Run one recovery sweep (missing bundles, unattested timestamps)
    Sweep(SweepArgs),
}

#[derive(Parser, Debug)]
pub struct SealArgs {
    /// Owning organization id
    #[arg(long)]
    pub org: String,

    /// Call id to seal
    #[arg(long)]
    pub call: String,

    /// Artifact to include, repeatable; order is preserved in the manifest
    #[arg(long = "artifact", value_name = "TYPE:ID=PATH", required = true)]
    pub artifacts: Vec<ArtifactSpec>,

    /// Actor recorded on the new records
    #[arg(long, default_value = "custody-cli")]
    pub actor: String,

    /// RFC 3161 TSA endpoint; omit to record bundles as not_configured
    #[arg(long, env = "CUSTODY_TSA_URL")]
    pub tsa_url: Option<String>,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Bundle id in the ledger database
    #[arg(required_unless_present = "export", conflicts_with = "export")]
    pub bundle_id: Option<Uuid>,

    /// Verify an exported bundle file instead of a stored one
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Artifact bytes to check, repeatable as `ID=PATH`; offline export
    /// verification may omit them and checks internal consistency only
    #[arg(long = "artifact", value_name = "ID=PATH")]
    pub artifacts: Vec<ArtifactPath>,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Call id to list
    #[arg(long)]
    pub call: String,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Bundle id to export
    pub bundle_id: Uuid,

    /// Write to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// RFC 3161 TSA endpoint for attaching missing timestamps
    #[arg(long, env = "CUSTODY_TSA_URL")]
    pub tsa_url: Option<String>,

    /// Minimum age in seconds before a bundle-less manifest is recovered
    #[arg(long, default_value_t = 0)]
    pub grace_secs: u64,

    /// Minimum age in seconds before an unattested bundle is resubmitted
    #[arg(long, default_value_t = 0)]
    pub retry_secs: u64,
}

/// `TYPE:ID=PATH`, e.g. `recording:rec_01=./call.wav`.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub kind: ArtifactKind,
    pub id: String,
    pub path: PathBuf,
}

impl FromStr for ArtifactSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind_str, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("expected TYPE:ID=PATH, got '{s}'"))?;
        let kind = ArtifactKind::parse(kind_str).ok_or_else(|| {
            format!("unknown artifact type '{kind_str}' (recording, transcript, translation, survey, score)")
        })?;
        let (id, path) = rest
            .split_once('=')
            .ok_or_else(|| format!("expected TYPE:ID=PATH, got '{s}'"))?;
        if id.is_empty() || path.is_empty() {
            return Err(format!("expected TYPE:ID=PATH, got '{s}'"));
        }
        Ok(Self {
            kind,
            id: id.to_string(),
            path: PathBuf::from(path),
        })
    }
}

/// `ID=PATH` mapping for verification.
#[derive(Debug, Clone)]
pub struct ArtifactPath {
    pub id: String,
    pub path: PathBuf,
}

impl FromStr for ArtifactPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ID=PATH, got '{s}'"))?;
        if id.is_empty() || path.is_empty() {
            return Err(format!("expected ID=PATH, got '{s}'"));
        }
        Ok(Self {
            id: id.to_string(),
            path: PathBuf::from(path),
        })
    }
}
