//! Typed errors for the custody store.

use thiserror::Error;
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the durable custody store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A frozen row rejected a mutation outside the two permitted
    /// transitions. This is the storage layer speaking — it fires even for
    /// raw SQL on a second connection — and is always surfaced distinctly.
    #[error("immutability violation: {message}")]
    ImmutabilityViolation { message: String },

    /// Another writer claimed `(call_id, version)` first. The caller retries
    /// with the next version number; never last-write-wins.
    #[error("manifest version {version} for call '{call_id}' already exists")]
    VersionConflict { call_id: String, version: u32 },

    /// A bundle for this manifest already exists. For recovery sweeps this is
    /// idempotent success, not a failure.
    #[error("bundle already exists for manifest {manifest_id}")]
    BundleExists { manifest_id: Uuid },

    /// Row lookup miss.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A persisted column held bytes that no longer parse (foreign tampering
    /// with the database file, not a custody transition).
    #[error("corrupt {column} on {kind} {id}: {message}")]
    CorruptRow {
        kind: &'static str,
        id: String,
        column: &'static str,
        message: String,
    },

    /// Artifact list (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else from SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl StoreError {
    pub fn is_immutability_violation(&self) -> bool {
        matches!(self, Self::ImmutabilityViolation { .. })
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Idempotent-success check for recovery sweeps.
    pub fn is_bundle_exists(&self) -> bool {
        matches!(self, Self::BundleExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    /// Trigger aborts carry the `custody immutable` marker in their message;
    /// everything else stays a plain SQLite error unless an insert site maps
    /// it more precisely (version conflict, bundle exists).
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
            if message.contains(super::schema::IMMUTABLE_MARKER) {
                return Self::ImmutabilityViolation {
                    message: message.clone(),
                };
            }
        }
        Self::Sqlite(err)
    }
}

/// True when the error is a UNIQUE constraint failure naming `table.column`.
pub(crate) fn is_unique_violation(err: &rusqlite::Error, qualified_column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, Some(message)) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation
                && message.contains("UNIQUE constraint failed")
                && message.contains(qualified_column)
        }
        _ => false,
    }
}
