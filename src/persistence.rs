//! Best-effort durable snapshots.
//!
//! The guard survives restarts by saving its cache map, recent-request log,
//! and provider failure times to a [`SnapshotStore`]. Load and save are both
//! best-effort: a corrupt or missing snapshot logs a warning and the guard
//! starts (or continues) with whatever is in memory.

use crate::cache::{CacheEntry, RequestRecord};
use crate::fallback::ProviderFailure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything the guard persists between runs. Breaker and window state are
/// deliberately absent: both are short-lived and rebuilt from live traffic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardSnapshot {
    #[serde(default)]
    pub cache: HashMap<String, CacheEntry>,
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderFailure>,
    #[serde(default)]
    pub total_requests: u64,
}

pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing usable is stored. Must not fail startup.
    fn load(&self) -> Option<GuardSnapshot>;
    /// Fire-and-forget; failures are logged by the implementation.
    fn save(&self, snapshot: &GuardSnapshot);
}

/// JSON-file-backed store.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SnapshotStore for FileStore {
    fn load(&self) -> Option<GuardSnapshot> {
        if !self.path.exists() {
            return None;
        }
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "snapshot read failed");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "snapshot parse failed");
                None
            }
        }
    }

    fn save(&self, snapshot: &GuardSnapshot) {
        let result = serde_json::to_string(snapshot)
            .map_err(std::io::Error::other)
            .and_then(|data| {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, data)
            });
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "snapshot save failed");
        }
    }
}

/// No-op store for hosts that opt out of persistence.
#[derive(Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl SnapshotStore for NullStore {
    fn load(&self) -> Option<GuardSnapshot> {
        None
    }
    fn save(&self, _snapshot: &GuardSnapshot) {}
}
