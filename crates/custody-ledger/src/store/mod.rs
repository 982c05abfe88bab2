//! Durable custody store (SQLite).
//!
//! This is the only persistence path for manifests and bundles, and the
//! immutability contract does not depend on that fact: schema triggers reject
//! every mutation outside the two permitted transitions, so even raw SQL over
//! a second connection cannot rewrite history (see `schema.rs`).
//!
//! All writes are inserts plus the single permitted TSA-attachment update and
//! the one-time supersession pointer; no broader locking discipline is
//! needed. Concurrent "insert next version" races resolve through the
//! `(call_id, version)` uniqueness constraint.

pub mod error;
mod schema;

use crate::tsa::TsaAttachment;
use crate::types::{ArtifactRef, Bundle, BundleExport, Manifest, TsaRecord, TsaStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub use error::{StoreError, StoreResult};

/// Handle to the custody ledger database.
///
/// Cheap to clone; all clones share one connection behind a mutex, the way
/// the rest of the product line wraps embedded SQLite.
#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerStore {
    /// Open (or create) a ledger database at `path` and install the schema,
    /// triggers included. Opening is the moment enforcement starts, so
    /// schema installation is not a separate step callers can forget.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory ledger for tests.
    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- manifests ----

    /// Insert a new manifest version.
    ///
    /// The losing side of a concurrent version race gets
    /// `StoreError::VersionConflict` and retries with the next number.
    pub fn insert_manifest(&self, manifest: &Manifest) -> StoreResult<()> {
        let artifacts_json = serde_json::to_string(&manifest.artifacts)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO manifests
                (id, call_id, organization_id, version, artifacts_json,
                 manifest_hash, created_at, created_by, superseded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
            params![
                manifest.id.to_string(),
                manifest.call_id,
                manifest.organization_id,
                manifest.version,
                artifacts_json,
                manifest.manifest_hash,
                encode_time(&manifest.created_at),
                manifest.created_by,
            ],
        )
        .map_err(|e| {
            if error::is_unique_violation(&e, "manifests.call_id") {
                StoreError::VersionConflict {
                    call_id: manifest.call_id.clone(),
                    version: manifest.version,
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    /// Apply the one-time supersession pointer on an earlier manifest.
    ///
    /// The trigger rejects this unless `superseded_by` is currently NULL, so
    /// a pointer can never be re-aimed.
    pub fn set_superseded_by(&self, manifest_id: Uuid, successor_id: Uuid) -> StoreResult<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE manifests SET superseded_by = ?2 WHERE id = ?1",
            params![manifest_id.to_string(), successor_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "manifest",
                id: manifest_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_manifest(&self, id: Uuid) -> StoreResult<Manifest> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("{MANIFEST_SELECT} WHERE id = ?1"),
                params![id.to_string()],
                manifest_row,
            )
            .optional()?;
        match row {
            Some(raw) => raw.decode(),
            None => Err(StoreError::NotFound {
                kind: "manifest",
                id: id.to_string(),
            }),
        }
    }

    /// Every manifest version for a call, ascending. All versions remain
    /// permanently retrievable; supersession never hides history.
    pub fn manifests_for_call(&self, call_id: &str) -> StoreResult<Vec<Manifest>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("{MANIFEST_SELECT} WHERE call_id = ?1 ORDER BY version ASC"))?;
        let rows = stmt.query_map(params![call_id], manifest_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.decode()?);
        }
        Ok(out)
    }

    pub fn latest_manifest(&self, call_id: &str) -> StoreResult<Option<Manifest>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("{MANIFEST_SELECT} WHERE call_id = ?1 ORDER BY version DESC LIMIT 1"),
                params![call_id],
                manifest_row,
            )
            .optional()?;
        raw.map(RawManifest::decode).transpose()
    }

    /// Next free version number for a call (1 for a new call). Purely
    /// advisory — the uniqueness constraint is what actually arbitrates.
    pub fn next_version(&self, call_id: &str) -> StoreResult<u32> {
        let conn = self.lock();
        let version: u32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM manifests WHERE call_id = ?1",
            params![call_id],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    /// Manifests created before `cutoff` that still have no bundle — the
    /// recovery sweep's first input. Rows mid-creation are excluded by the
    /// cutoff, never by guessing at writer state.
    pub fn manifests_without_bundle(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Manifest>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{MANIFEST_SELECT_QUALIFIED}
             FROM manifests m LEFT JOIN bundles b ON b.manifest_id = m.id
             WHERE b.id IS NULL AND m.created_at < ?1
             ORDER BY m.created_at ASC"
        ))?;
        let rows = stmt.query_map(params![encode_time(&cutoff)], manifest_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.decode()?);
        }
        Ok(out)
    }

    // ---- bundles ----

    /// Insert a bundle, frozen at creation (`immutable_storage` is written
    /// with the row, and the schema refuses anything but 1 there).
    pub fn insert_bundle(&self, bundle: &Bundle) -> StoreResult<()> {
        let artifact_hashes_json = serde_json::to_string(&bundle.artifact_hashes)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO bundles
                (id, call_id, organization_id, version, manifest_id, manifest_hash,
                 artifact_hashes_json, bundle_hash, immutable_storage,
                 created_at, created_by, tsa_status, tsa_url, tsa_timestamp,
                 tsa_policy_oid, tsa_serial, tsa_token, tsa_token_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                bundle.id.to_string(),
                bundle.call_id,
                bundle.organization_id,
                bundle.version,
                bundle.manifest_id.to_string(),
                bundle.manifest_hash,
                artifact_hashes_json,
                bundle.bundle_hash,
                encode_time(&bundle.created_at),
                bundle.created_by,
                bundle.tsa.status.to_string(),
                bundle.tsa.tsa_url,
                bundle.tsa.timestamp.as_ref().map(encode_time),
                bundle.tsa.policy_oid,
                bundle.tsa.serial,
                bundle.tsa.token,
                bundle.tsa.token_hash,
            ],
        )
        .map_err(|e| {
            if error::is_unique_violation(&e, "bundles.manifest_id") {
                StoreError::BundleExists {
                    manifest_id: bundle.manifest_id,
                }
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    pub fn get_bundle(&self, id: Uuid) -> StoreResult<Bundle> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("{BUNDLE_SELECT} WHERE id = ?1"),
                params![id.to_string()],
                bundle_row,
            )
            .optional()?;
        match raw {
            Some(raw) => raw.decode(),
            None => Err(StoreError::NotFound {
                kind: "bundle",
                id: id.to_string(),
            }),
        }
    }

    pub fn bundle_for_manifest(&self, manifest_id: Uuid) -> StoreResult<Option<Bundle>> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("{BUNDLE_SELECT} WHERE manifest_id = ?1"),
                params![manifest_id.to_string()],
                bundle_row,
            )
            .optional()?;
        raw.map(RawBundle::decode).transpose()
    }

    pub fn bundles_for_call(&self, call_id: &str) -> StoreResult<Vec<Bundle>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare(&format!("{BUNDLE_SELECT} WHERE call_id = ?1 ORDER BY version ASC"))?;
        let rows = stmt.query_map(params![call_id], bundle_row)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.decode()?);
        }
        Ok(out)
    }

    /// Bundles still awaiting attestation, created before `cutoff`.
    ///
    /// `include_not_configured` covers the case where a TSA endpoint was
    /// configured after the bundles were created; the `not_configured →
    /// attached` transition is permitted, so recovery may complete them.
    pub fn bundles_awaiting_tsa(
        &self,
        cutoff: DateTime<Utc>,
        include_not_configured: bool,
    ) -> StoreResult<Vec<Bundle>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{BUNDLE_SELECT}
             WHERE (tsa_status = 'pending' OR (?2 AND tsa_status = 'not_configured'))
               AND created_at < ?1
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(
            params![encode_time(&cutoff), include_not_configured],
            bundle_row,
        )?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.decode()?);
        }
        Ok(out)
    }

    /// Perform the one-way TSA attachment.
    ///
    /// No status filter in the WHERE clause on purpose: an attempt against an
    /// already-attached bundle reaches the trigger and surfaces as
    /// `ImmutabilityViolation`, never as a silent overwrite.
    pub fn attach_tsa(&self, bundle_id: Uuid, attachment: &TsaAttachment) -> StoreResult<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE bundles SET
                tsa_status = 'attached',
                tsa_url = ?2,
                tsa_timestamp = ?3,
                tsa_policy_oid = ?4,
                tsa_serial = ?5,
                tsa_token = ?6,
                tsa_token_hash = ?7
             WHERE id = ?1",
            params![
                bundle_id.to_string(),
                attachment.tsa_url,
                encode_time(&attachment.timestamp),
                attachment.policy_oid,
                attachment.serial,
                attachment.token_b64,
                attachment.token_hash,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "bundle",
                id: bundle_id.to_string(),
            });
        }
        Ok(())
    }

    /// Self-contained export for offline/third-party verification.
    pub fn export_bundle(&self, bundle_id: Uuid) -> StoreResult<BundleExport> {
        let bundle = self.get_bundle(bundle_id)?;
        let manifest = self.get_manifest(bundle.manifest_id)?;
        Ok(BundleExport { bundle, manifest })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("ledger store mutex poisoned")
    }
}

const MANIFEST_SELECT: &str = "SELECT id, call_id, organization_id, version, artifacts_json, \
     manifest_hash, created_at, created_by, superseded_by FROM manifests";

const MANIFEST_SELECT_QUALIFIED: &str =
    "SELECT m.id, m.call_id, m.organization_id, m.version, m.artifacts_json, \
     m.manifest_hash, m.created_at, m.created_by, m.superseded_by";

const BUNDLE_SELECT: &str = "SELECT id, call_id, organization_id, version, manifest_id, \
     manifest_hash, artifact_hashes_json, bundle_hash, immutable_storage, created_at, \
     created_by, tsa_status, tsa_url, tsa_timestamp, tsa_policy_oid, tsa_serial, \
     tsa_token, tsa_token_hash FROM bundles";

/// RFC 3339 UTC, full precision. Same grammar chrono's serde emits, so a
/// row loaded back rehashes to exactly its stored hash.
fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

struct RawManifest {
    id: String,
    call_id: String,
    organization_id: String,
    version: u32,
    artifacts_json: String,
    manifest_hash: String,
    created_at: String,
    created_by: String,
    superseded_by: Option<String>,
}

fn manifest_row(row: &Row<'_>) -> rusqlite::Result<RawManifest> {
    Ok(RawManifest {
        id: row.get(0)?,
        call_id: row.get(1)?,
        organization_id: row.get(2)?,
        version: row.get(3)?,
        artifacts_json: row.get(4)?,
        manifest_hash: row.get(5)?,
        created_at: row.get(6)?,
        created_by: row.get(7)?,
        superseded_by: row.get(8)?,
    })
}

impl RawManifest {
    fn decode(self) -> StoreResult<Manifest> {
        let artifacts: Vec<ArtifactRef> = serde_json::from_str(&self.artifacts_json)?;
        Ok(Manifest {
            id: parse_uuid("manifest", &self.id, "id", &self.id)?,
            version: self.version,
            organization_id: self.organization_id,
            call_id: self.call_id,
            artifacts,
            manifest_hash: self.manifest_hash,
            created_at: parse_time("manifest", &self.id, "created_at", &self.created_at)?,
            created_by: self.created_by,
            superseded_by: self
                .superseded_by
                .as_deref()
                .map(|s| parse_uuid("manifest", &self.id, "superseded_by", s))
                .transpose()?,
        })
    }
}

struct RawBundle {
    id: String,
    call_id: String,
    organization_id: String,
    version: u32,
    manifest_id: String,
    manifest_hash: String,
    artifact_hashes_json: String,
    bundle_hash: String,
    immutable_storage: bool,
    created_at: String,
    created_by: String,
    tsa_status: String,
    tsa_url: Option<String>,
    tsa_timestamp: Option<String>,
    tsa_policy_oid: Option<String>,
    tsa_serial: Option<String>,
    tsa_token: Option<String>,
    tsa_token_hash: Option<String>,
}

fn bundle_row(row: &Row<'_>) -> rusqlite::Result<RawBundle> {
    Ok(RawBundle {
        id: row.get(0)?,
        call_id: row.get(1)?,
        organization_id: row.get(2)?,
        version: row.get(3)?,
        manifest_id: row.get(4)?,
        manifest_hash: row.get(5)?,
        artifact_hashes_json: row.get(6)?,
        bundle_hash: row.get(7)?,
        immutable_storage: row.get(8)?,
        created_at: row.get(9)?,
        created_by: row.get(10)?,
        tsa_status: row.get(11)?,
        tsa_url: row.get(12)?,
        tsa_timestamp: row.get(13)?,
        tsa_policy_oid: row.get(14)?,
        tsa_serial: row.get(15)?,
        tsa_token: row.get(16)?,
        tsa_token_hash: row.get(17)?,
    })
}

impl RawBundle {
    fn decode(self) -> StoreResult<Bundle> {
        let artifact_hashes: Vec<ArtifactRef> = serde_json::from_str(&self.artifact_hashes_json)?;
        let status = TsaStatus::parse(&self.tsa_status).ok_or_else(|| StoreError::CorruptRow {
            kind: "bundle",
            id: self.id.clone(),
            column: "tsa_status",
            message: format!("unknown status '{}'", self.tsa_status),
        })?;
        Ok(Bundle {
            id: parse_uuid("bundle", &self.id, "id", &self.id)?,
            version: self.version,
            organization_id: self.organization_id,
            call_id: self.call_id,
            manifest_id: parse_uuid("bundle", &self.id, "manifest_id", &self.manifest_id)?,
            manifest_hash: self.manifest_hash,
            artifact_hashes,
            bundle_hash: self.bundle_hash,
            immutable_storage: self.immutable_storage,
            created_at: parse_time("bundle", &self.id, "created_at", &self.created_at)?,
            created_by: self.created_by,
            tsa: TsaRecord {
                status,
                tsa_url: self.tsa_url,
                timestamp: self
                    .tsa_timestamp
                    .as_deref()
                    .map(|s| parse_time("bundle", &self.id, "tsa_timestamp", s))
                    .transpose()?,
                policy_oid: self.tsa_policy_oid,
                serial: self.tsa_serial,
                token: self.tsa_token,
                token_hash: self.tsa_token_hash,
            },
        })
    }
}

fn parse_uuid(kind: &'static str, row_id: &str, column: &'static str, s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::CorruptRow {
        kind,
        id: row_id.to_string(),
        column,
        message: e.to_string(),
    })
}

fn parse_time(
    kind: &'static str,
    row_id: &str,
    column: &'static str,
    s: &str,
) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            kind,
            id: row_id.to_string(),
            column,
            message: e.to_string(),
        })
}
