//! Custody record types.
//!
//! These are both the persisted shapes and the wire shapes: a `Bundle`
//! serialized to JSON is exactly what an auditor receives. Field changes here
//! are hash-affecting and must be treated like a format version bump.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Artifact classes a call can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Recording,
    Transcript,
    Translation,
    Survey,
    Score,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Recording => "recording",
            Self::Transcript => "transcript",
            Self::Translation => "translation",
            Self::Survey => "survey",
            Self::Score => "score",
        };
        f.write_str(s)
    }
}

impl ArtifactKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recording" => Some(Self::Recording),
            "transcript" => Some(Self::Transcript),
            "translation" => Some(Self::Translation),
            "survey" => Some(Self::Survey),
            "score" => Some(Self::Score),
            _ => None,
        }
    }
}

/// Reference to one externally produced artifact.
///
/// The producer owns the artifact and its hash; this ledger only records and
/// later reconfirms them. `sha256` carries the `sha256:` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact class
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    /// Producer-assigned artifact identifier
    pub id: String,
    /// Content digest, `sha256:<hex>`
    pub sha256: String,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, id: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            sha256: sha256.into(),
        }
    }
}

/// Immutable, ordered list of artifact references for one call, at one
/// version.
///
/// Append-only: a later manifest for the same `call_id` supersedes an earlier
/// one via the one-time `superseded_by` pointer; nothing else on the earlier
/// record is ever rewritten. `superseded_by` is deliberately outside the
/// manifest hash — it is the only field applied after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: Uuid,
    /// Version within `call_id`, starting at 1
    pub version: u32,
    pub organization_id: String,
    pub call_id: String,
    /// Construction order is preserved and semantic
    pub artifacts: Vec<ArtifactRef>,
    /// `sha256:` hash over the canonical manifest minus this field and
    /// `superseded_by`
    pub manifest_hash: String,
    pub created_at: DateTime<Utc>,
    /// Triggering actor (service or operator identity)
    pub created_by: String,
    /// One-time forward pointer to the manifest that replaced this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
}

/// Immutable package wrapping a manifest hash plus all referenced artifact
/// hashes, itself hashed, optionally timestamped by an external TSA.
///
/// `immutable_storage` is set at row creation, never flipped later. The TSA
/// sub-record is the only part of a bundle that ever changes, and only via
/// the forward transition `pending`/`not_configured` → `attached`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "bundle_id")]
    pub id: Uuid,
    pub version: u32,
    pub organization_id: String,
    pub call_id: String,
    pub manifest_id: Uuid,
    pub manifest_hash: String,
    /// Copied from the manifest at build time, same order
    pub artifact_hashes: Vec<ArtifactRef>,
    /// `sha256:` hash over the canonical bundle minus this field and `tsa`
    pub bundle_hash: String,
    pub immutable_storage: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub tsa: TsaRecord,
}

/// TSA attachment state of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TsaStatus {
    /// A token is present and final
    Attached,
    /// Submission has not succeeded yet; Recovery will retry
    Pending,
    /// No TSA endpoint is configured
    NotConfigured,
}

impl std::fmt::Display for TsaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Attached => "attached",
            Self::Pending => "pending",
            Self::NotConfigured => "not_configured",
        };
        f.write_str(s)
    }
}

impl TsaStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attached" => Some(Self::Attached),
            "pending" => Some(Self::Pending),
            "not_configured" => Some(Self::NotConfigured),
            _ => None,
        }
    }
}

/// RFC 3161 attestation record attached to one bundle.
///
/// Transitions only forward; an attached token is never overwritten. The
/// token itself is stored base64, with its own digest so verifiers can check
/// the stored bytes without parsing CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsaRecord {
    pub status: TsaStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsa_url: Option<String>,
    /// genTime from the token's TSTInfo
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_oid: Option<String>,
    /// TSA-assigned serial number, hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Raw timestamp token (CMS ContentInfo), base64
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `sha256:` digest of the raw token bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_hash: Option<String>,
}

impl TsaRecord {
    /// Initial record for a bundle created while a TSA endpoint is configured.
    pub fn pending() -> Self {
        Self {
            status: TsaStatus::Pending,
            tsa_url: None,
            timestamp: None,
            policy_oid: None,
            serial: None,
            token: None,
            token_hash: None,
        }
    }

    /// Initial record when no TSA endpoint is configured.
    pub fn not_configured() -> Self {
        Self {
            status: TsaStatus::NotConfigured,
            ..Self::pending()
        }
    }

    pub fn is_attached(&self) -> bool {
        self.status == TsaStatus::Attached
    }
}

/// Fully self-contained export of one bundle for offline verification.
///
/// Contains everything a third party needs to recompute the manifest and
/// bundle hashes and check the TSA token; no store access, no secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleExport {
    pub bundle: Bundle,
    pub manifest: Manifest,
}
