//! Canonicalization and hashing primitives.
//!
//! Everything the ledger certifies rests on two properties:
//!
//! 1. Canonical bytes are deterministic across implementations (JCS).
//! 2. A record's hash never covers the hash field itself.

pub mod hash;
pub mod jcs;

pub use hash::{compute_bundle_hash, compute_manifest_hash, sha256_hex};
pub use jcs::CanonicalizationError;
