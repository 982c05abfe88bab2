//! Ledger-level error taxonomy.
//!
//! Write-path failures (input integrity, canonicalization, immutability,
//! version exhaustion) are hard errors to the immediate caller. TSA
//! unavailability is NOT here: it is recorded as `pending` on the bundle and
//! recovered out-of-band, never surfaced as a call-finalization failure.
//! Verification mismatches are data (`VerifyReport`), not errors.

use crate::crypto::CanonicalizationError;
use crate::registry::RegistryError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the custody write path and lookups.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced artifact's live hash no longer matches its descriptor.
    /// Fails closed before any manifest is created: we refuse to certify a
    /// manifest over already-corrupted input.
    #[error("artifact integrity failure for '{artifact_id}': expected {expected}, registry reports {actual}")]
    InputIntegrity {
        artifact_id: String,
        expected: String,
        actual: String,
    },

    /// A manifest with no artifacts would certify nothing.
    #[error("refusing to build an empty manifest for call '{call_id}'")]
    EmptyManifest { call_id: String },

    /// Input could not be deterministically serialized. Fails closed.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    /// Artifact registry lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Storage-layer failure, including `ImmutabilityViolation` and
    /// `VersionConflict` — kept typed so callers can distinguish them.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The bounded retry loop for the version race was exhausted.
    #[error("could not claim a manifest version for call '{call_id}' after {attempts} attempts")]
    VersionRaceExhausted { call_id: String, attempts: u32 },
}

impl LedgerError {
    /// True when a frozen record rejected a mutation.
    pub fn is_immutability_violation(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_immutability_violation())
    }

    /// True when the operation failed closed on input integrity.
    pub fn is_input_integrity(&self) -> bool {
        matches!(self, Self::InputIntegrity { .. })
    }
}
