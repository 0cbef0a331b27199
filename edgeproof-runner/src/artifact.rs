//! Model artifact persistence with a sibling backup for rollback.
//!
//! The artifact is a pretty-printed JSON blob. Before an update the current
//! blob is copied verbatim to the backup path; a rollback copies it back and
//! verifies the restored bytes hash to the backup's BLAKE3 digest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use edgeproof_core::{FEATURE_NAMES, FEATURE_SCHEMA_VERSION};

use crate::model::BoostedEnsemble;

/// Version of the artifact file layout.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact at {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("artifact feature schema v{found} does not match current v{expected}")]
    SchemaMismatch { expected: u32, found: u32 },

    #[error("no backup at {0} to restore from")]
    MissingBackup(PathBuf),

    #[error("restored artifact checksum {restored} differs from backup {backup}")]
    ChecksumMismatch { backup: String, restored: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub feature_schema_version: u32,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    /// Number of warm-start updates applied since the cold start.
    pub update_count: u64,
    /// Samples seen by the most recent training call.
    pub trained_samples: usize,
    pub ensemble: BoostedEnsemble,
}

impl ModelArtifact {
    pub fn new(ensemble: BoostedEnsemble, trained_at: DateTime<Utc>, trained_samples: usize) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_schema_version: FEATURE_SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            trained_at,
            update_count: 0,
            trained_samples,
            ensemble,
        }
    }

    /// Successor artifact after a warm-start update.
    pub fn updated(&self, ensemble: BoostedEnsemble, trained_at: DateTime<Utc>, trained_samples: usize) -> Self {
        Self {
            trained_at,
            update_count: self.update_count + 1,
            trained_samples,
            ensemble,
            ..self.clone()
        }
    }
}

/// BLAKE3 hex digest of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Current + backup artifact paths.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
    backup_path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_path: backup_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the current artifact, `None` if it does not exist.
    pub fn load(&self) -> Result<Option<ModelArtifact>, ArtifactError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = read(&self.path)?;
        let artifact: ModelArtifact =
            serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if artifact.feature_schema_version != FEATURE_SCHEMA_VERSION {
            return Err(ArtifactError::SchemaMismatch {
                expected: FEATURE_SCHEMA_VERSION,
                found: artifact.feature_schema_version,
            });
        }
        Ok(Some(artifact))
    }

    /// Sibling file the next artifact is staged in before it replaces the current one.
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Write `artifact` as the current model. Returns the checksum written.
    ///
    /// The bytes go to the staging file first and are renamed over the
    /// current artifact, so a failed write leaves the old file untouched.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<String, ArtifactError> {
        let json = serde_json::to_vec_pretty(artifact)?;
        ensure_parent(&self.path)?;
        let staging = self.staging_path();
        std::fs::write(&staging, &json).map_err(|source| ArtifactError::Io {
            path: staging.clone(),
            source,
        })?;
        std::fs::rename(&staging, &self.path).map_err(|source| ArtifactError::Io {
            path: self.path.clone(),
            source,
        })?;
        let sum = checksum(&json);
        info!(path = %self.path.display(), checksum = %sum, "model artifact written");
        Ok(sum)
    }

    /// Copy the current artifact verbatim to the backup path.
    ///
    /// Returns the backup checksum, or `None` when there is nothing to back up.
    pub fn backup(&self) -> Result<Option<String>, ArtifactError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = read(&self.path)?;
        ensure_parent(&self.backup_path)?;
        std::fs::write(&self.backup_path, &bytes).map_err(|source| ArtifactError::Io {
            path: self.backup_path.clone(),
            source,
        })?;
        let sum = checksum(&bytes);
        info!(path = %self.backup_path.display(), checksum = %sum, "model artifact backed up");
        Ok(Some(sum))
    }

    /// Restore the backup over the current artifact, verifying byte identity.
    pub fn restore(&self) -> Result<String, ArtifactError> {
        if !self.backup_path.exists() {
            return Err(ArtifactError::MissingBackup(self.backup_path.clone()));
        }
        let backup = read(&self.backup_path)?;
        std::fs::write(&self.path, &backup).map_err(|source| ArtifactError::Io {
            path: self.path.clone(),
            source,
        })?;

        let backup_sum = checksum(&backup);
        let restored_sum = checksum(&read(&self.path)?);
        if backup_sum != restored_sum {
            return Err(ArtifactError::ChecksumMismatch {
                backup: backup_sum,
                restored: restored_sum,
            });
        }
        warn!(path = %self.path.display(), checksum = %restored_sum, "model artifact rolled back");
        Ok(restored_sum)
    }

    /// Delete the current artifact, if present.
    pub fn remove(&self) -> Result<(), ArtifactError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|source| ArtifactError::Io {
                path: self.path.clone(),
                source,
            })?;
            warn!(path = %self.path.display(), "model artifact removed");
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    std::fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), ArtifactError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}
