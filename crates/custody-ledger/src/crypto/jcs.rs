//! JSON Canonicalization Scheme (RFC 8785) serialization.
//!
//! Provides deterministic JSON bytes for cryptographic hashing. Uses
//! `serde_jcs`, which guarantees:
//!
//! - Lexicographic key ordering at every nesting level
//! - No insignificant whitespace
//! - UTF-8 encoding
//! - IEEE 754 number normalization (1.0 → 1)
//!
//! Array order is preserved as given: artifact order inside a manifest is
//! semantic (construction order), never sorted.

use serde::Serialize;
use thiserror::Error;

/// A record could not be deterministically serialized.
///
/// This fails closed: no hash is computed and no record is persisted over
/// bytes whose canonical form is ambiguous.
#[derive(Debug, Error)]
#[error("canonicalization failed: {0}")]
pub struct CanonicalizationError(#[from] serde_json::Error);

/// Serialize a value to JCS (RFC 8785) canonical JSON bytes.
///
/// # Example
///
/// ```
/// use custody_ledger::crypto::jcs;
/// use serde_json::json;
///
/// let value = json!({"b": 2, "a": 1});
/// let bytes = jcs::to_vec(&value).unwrap();
/// assert_eq!(bytes, br#"{"a":1,"b":2}"#);
/// ```
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalizationError> {
    Ok(serde_jcs::to_vec(value)?)
}

/// Serialize to a JCS canonical JSON string.
pub fn to_string<T: Serialize>(value: &T) -> Result<String, CanonicalizationError> {
    Ok(serde_jcs::to_string(value)?)
}
