//! File-backed artifact registry.
//!
//! Maps artifact ids to local paths and hashes the file bytes on every
//! lookup. This is the CLI's stand-in for the producer services: digests
//! always come from the bytes on disk right now, never from a cache.

use async_trait::async_trait;
use custody_ledger::crypto::sha256_hex;
use custody_ledger::registry::{ArtifactRegistry, RegistryError};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct FileRegistry {
    paths: HashMap<String, PathBuf>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, artifact_id: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(artifact_id.into(), path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[async_trait]
impl ArtifactRegistry for FileRegistry {
    async fn live_digest(&self, artifact_id: &str) -> Result<String, RegistryError> {
        let path = self.paths.get(artifact_id).ok_or_else(|| RegistryError::NotFound {
            id: artifact_id.to_string(),
        })?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RegistryError::Unavailable {
                id: artifact_id.to_string(),
                message: format!("{}: {e}", path.display()),
            })?;
        Ok(sha256_hex(&bytes))
    }
}
