//! Last-sync checkpoint persistence
//!
//! The checkpoint is the start instant of the last successful cycle, in epoch
//! milliseconds. `0` means the connector has never synced.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last successful sync in epoch milliseconds, `0` if never
    async fn load(&self) -> Result<i64>;

    async fn store(&self, last_sync_ms: i64) -> Result<()>;
}

/// Checkpoint kept only for the life of the process
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    last_sync: AtomicI64,
}

impl MemoryCheckpoint {
    pub fn new(last_sync_ms: i64) -> Self {
        Self {
            last_sync: AtomicI64::new(last_sync_ms),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoint {
    async fn load(&self) -> Result<i64> {
        Ok(self.last_sync.load(Ordering::SeqCst))
    }

    async fn store(&self, last_sync_ms: i64) -> Result<()> {
        self.last_sync.store(last_sync_ms, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointFile {
    last_sync: i64,
}

/// Checkpoint mirrored to a JSON file `{"lastSync": <ms>}`.
///
/// The in-memory value advances on `store` even when the file write fails.
#[derive(Debug)]
pub struct FileCheckpoint {
    path: PathBuf,
    last_sync: AtomicI64,
}

impl FileCheckpoint {
    /// Open the checkpoint at `path`. A missing file means never synced; an
    /// unreadable one is logged and treated the same way.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_sync = read_checkpoint(&path).await.unwrap_or(0);
        debug!(path = %path.display(), last_sync, "Opened checkpoint");
        Self {
            path,
            last_sync: AtomicI64::new(last_sync),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_checkpoint(path: &Path) -> Option<i64> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read checkpoint, starting with a full sync");
            return None;
        }
    };

    match serde_json::from_str::<CheckpointFile>(&raw) {
        Ok(file) => Some(file.last_sync),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt checkpoint, starting with a full sync");
            None
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpoint {
    async fn load(&self) -> Result<i64> {
        Ok(self.last_sync.load(Ordering::SeqCst))
    }

    async fn store(&self, last_sync_ms: i64) -> Result<()> {
        self.last_sync.store(last_sync_ms, Ordering::SeqCst);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string(&CheckpointFile {
            last_sync: last_sync_ms,
        })?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
