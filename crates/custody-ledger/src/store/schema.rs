//! Schema boundary for the custody store.
//!
//! Immutability is enforced HERE, in the storage layer, not by application
//! discipline: BEFORE UPDATE / BEFORE DELETE triggers abort anything except
//! the two permitted transitions, so no code path — including raw SQL over a
//! second connection — can rewrite custody history.
//!
//! Permitted transitions:
//! - manifests: a one-time `superseded_by` pointer (NULL → non-NULL), every
//!   other column byte-identical.
//! - bundles: the one-way TSA attachment (`pending`/`not_configured` →
//!   `attached`, token required), every frozen column byte-identical.

use anyhow::Context;
use rusqlite::Connection;

/// Marker embedded in every trigger abort message; the error mapper keys on
/// it to surface `StoreError::ImmutabilityViolation`.
pub(crate) const IMMUTABLE_MARKER: &str = "custody immutable";

pub(crate) const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS manifests (
    id              TEXT PRIMARY KEY,
    call_id         TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    version         INTEGER NOT NULL,
    artifacts_json  TEXT NOT NULL,
    manifest_hash   TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    created_by      TEXT NOT NULL,
    superseded_by   TEXT REFERENCES manifests(id),
    UNIQUE (call_id, version)
);

CREATE INDEX IF NOT EXISTS idx_manifests_call ON manifests(call_id);

CREATE TABLE IF NOT EXISTS bundles (
    id                   TEXT PRIMARY KEY,
    call_id              TEXT NOT NULL,
    organization_id      TEXT NOT NULL,
    version              INTEGER NOT NULL,
    manifest_id          TEXT NOT NULL UNIQUE REFERENCES manifests(id),
    manifest_hash        TEXT NOT NULL,
    artifact_hashes_json TEXT NOT NULL,
    bundle_hash          TEXT NOT NULL,
    immutable_storage    INTEGER NOT NULL CHECK (immutable_storage = 1),
    created_at           TEXT NOT NULL,
    created_by           TEXT NOT NULL,
    tsa_status           TEXT NOT NULL
        CHECK (tsa_status IN ('attached','pending','not_configured')),
    tsa_url              TEXT,
    tsa_timestamp        TEXT,
    tsa_policy_oid       TEXT,
    tsa_serial           TEXT,
    tsa_token            TEXT,
    tsa_token_hash       TEXT
);

CREATE INDEX IF NOT EXISTS idx_bundles_call ON bundles(call_id);
CREATE INDEX IF NOT EXISTS idx_bundles_tsa_status ON bundles(tsa_status);

CREATE TRIGGER IF NOT EXISTS manifests_no_delete
BEFORE DELETE ON manifests
BEGIN
    SELECT RAISE(ABORT, 'custody immutable: manifest rows are append-only');
END;

CREATE TRIGGER IF NOT EXISTS manifests_freeze
BEFORE UPDATE ON manifests
WHEN NOT (
    NEW.id = OLD.id
    AND NEW.call_id = OLD.call_id
    AND NEW.organization_id = OLD.organization_id
    AND NEW.version = OLD.version
    AND NEW.artifacts_json = OLD.artifacts_json
    AND NEW.manifest_hash = OLD.manifest_hash
    AND NEW.created_at = OLD.created_at
    AND NEW.created_by = OLD.created_by
    AND OLD.superseded_by IS NULL
    AND NEW.superseded_by IS NOT NULL
)
BEGIN
    SELECT RAISE(ABORT, 'custody immutable: manifest rows accept only a one-time supersession pointer');
END;

CREATE TRIGGER IF NOT EXISTS bundles_no_delete
BEFORE DELETE ON bundles
BEGIN
    SELECT RAISE(ABORT, 'custody immutable: bundle rows are append-only');
END;

CREATE TRIGGER IF NOT EXISTS bundles_freeze
BEFORE UPDATE ON bundles
WHEN NOT (
    NEW.id = OLD.id
    AND NEW.call_id = OLD.call_id
    AND NEW.organization_id = OLD.organization_id
    AND NEW.version = OLD.version
    AND NEW.manifest_id = OLD.manifest_id
    AND NEW.manifest_hash = OLD.manifest_hash
    AND NEW.artifact_hashes_json = OLD.artifact_hashes_json
    AND NEW.bundle_hash = OLD.bundle_hash
    AND NEW.immutable_storage = OLD.immutable_storage
    AND NEW.created_at = OLD.created_at
    AND NEW.created_by = OLD.created_by
    AND OLD.tsa_status IN ('pending','not_configured')
    AND NEW.tsa_status = 'attached'
    AND NEW.tsa_token IS NOT NULL
    AND NEW.tsa_token_hash IS NOT NULL
)
BEGIN
    SELECT RAISE(ABORT, 'custody immutable: bundle rows accept only a one-way tsa attachment');
END;
"#;

pub(crate) fn init(conn: &Connection) -> anyhow::Result<()> {
    // SQLite honors the REFERENCES clauses only with this per-connection
    // pragma on; every store connection passes through here.
    conn.pragma_update(None, "foreign_keys", true)
        .context("failed to enable foreign key enforcement")?;
    conn.execute_batch(DDL)
        .context("failed to initialize custody schema")?;
    Ok(())
}
