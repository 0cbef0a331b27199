//! Updater watermark: when the model was last updated and which trades it
//! has already consumed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::artifact::{ensure_parent, ArtifactError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub last_update: Option<DateTime<Utc>>,
    /// Exit time of the newest trade folded into the model.
    pub last_exit_watermark: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_updates: u64,
    #[serde(default)]
    pub last_rejection: Option<DateTime<Utc>>,
}

impl RunState {
    /// Load from `path`; a missing file is the initial state.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let json = serde_json::to_vec_pretty(self)?;
        ensure_parent(path)?;
        std::fs::write(path, json).map_err(|source| ArtifactError::Io {
            path: PathBuf::from(path),
            source,
        })?;
        info!(path = %path.display(), "run state written");
        Ok(())
    }

    /// Time left until the cooldown expires, `None` once it has.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_update?;
        let ready_at = last + cooldown;
        (now < ready_at).then(|| ready_at - now)
    }

    /// Whether a closed trade is newer than the watermark.
    pub fn is_new(&self, exit_time: DateTime<Utc>) -> bool {
        match self.last_exit_watermark {
            Some(w) => exit_time > w,
            None => true,
        }
    }

    pub fn advance(&mut self, now: DateTime<Utc>, watermark: Option<DateTime<Utc>>) {
        self.last_update = Some(now);
        if let Some(w) = watermark {
            self.last_exit_watermark = Some(self.last_exit_watermark.map_or(w, |old| old.max(w)));
        }
    }

    pub fn record_rejection(&mut self, now: DateTime<Utc>) {
        self.rejected_updates += 1;
        self.last_rejection = Some(now);
    }
}
