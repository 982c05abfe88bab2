//! Evidence custody ledger for finalized call artifacts.
//!
//! Turns a call's finalized artifacts (recording, transcript, translation,
//! survey, score) into tamper-evident, independently verifiable records:
//!
//! - **Manifest**: ordered artifact references + producer metadata, hashed
//!   over its canonical (RFC 8785) form. Append-only, versioned per call.
//! - **Bundle**: wraps the manifest hash plus every artifact hash, itself
//!   hashed, frozen at creation, optionally timestamped by an RFC 3161 TSA.
//! - **Verification**: recomputes every hash from first principles so a party
//!   with no write access can confirm integrity.
//!
//! Scope notes: this crate provides tamper-evidence and time-of-existence,
//! not signer non-repudiation. Timestamping is best-effort and asynchronous;
//! a bundle's own hash is complete and valid without it.

pub mod bundle;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod recovery;
pub mod registry;
pub mod store;
pub mod tsa;
pub mod types;
pub mod verify;

// Convenience re-exports
pub use bundle::build_bundle;
pub use error::LedgerError;
pub use ledger::{CustodyLedger, SealOutcome, SealRequest};
pub use manifest::{build_manifest, ManifestInput};
pub use recovery::{RecoveryConfig, RecoveryJob, SweepReport};
pub use registry::{ArtifactRegistry, InMemoryRegistry, RegistryError};
pub use store::{LedgerStore, StoreError};
pub use tsa::worker::{spawn_tsa_worker, TsaJob};
pub use tsa::{TsaAttachment, TsaClient, TsaConfig, TsaError};
pub use types::{
    ArtifactKind, ArtifactRef, Bundle, BundleExport, Manifest, TsaRecord, TsaStatus,
};
pub use verify::{verify_export, ArtifactCheck, VerifyReport, Verifier};
