//! Persisted snapshot slot.
//!
//! One JSON file holds the single active snapshot:
//!
//! ```json
//! {
//!   "content": "...",
//!   "timestamp": "2026-10-16T08:00:00Z",
//!   "source": "live",
//!   "quality_score": 0.83,
//!   "is_valid": true
//! }
//! ```
//!
//! Writes go to a sibling temp file that is renamed over the slot, so a
//! reader never sees a half-written entry. Two processes writing at once
//! still race; the last rename wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_common::{Result, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{ContextSnapshot, Provenance};

/// On-disk form of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub source: Provenance,
    pub quality_score: f64,
    pub is_valid: bool,
}

impl From<&ContextSnapshot> for PersistedSnapshot {
    fn from(snapshot: &ContextSnapshot) -> Self {
        Self {
            content: snapshot.content.clone(),
            timestamp: snapshot.acquired_at,
            source: snapshot.provenance,
            quality_score: snapshot.quality_score,
            is_valid: snapshot.is_valid,
        }
    }
}

/// File-backed single-slot snapshot cache.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the slot. Missing or unreadable files yield `None`; corrupt files are removed.
    pub fn load(&self) -> Option<PersistedSnapshot> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read snapshot cache");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt snapshot cache, removing");
                self.remove();
                None
            }
        }
    }

    /// Overwrite the slot with `snapshot`.
    pub fn store(&self, snapshot: &ContextSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .context(format!("creating cache directory {}", dir.display()))?;
            }
        }

        let entry = PersistedSnapshot::from(snapshot);
        let json = serde_json::to_string_pretty(&entry)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context(format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).context(format!("replacing {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Snapshot cache written");
        Ok(())
    }

    /// Delete the slot if present.
    pub fn remove(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Snapshot cache removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove snapshot cache"
            ),
        }
    }
}
