// src/cache/persist.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cache::Snapshot;
use crate::error::PersistError;

#[async_trait]
pub trait SnapshotPersistence: Send + Sync {
    /// Snapshot to start from. Absence of a saved snapshot is not an error.
    async fn load(&self) -> Result<Snapshot, PersistError>;
    /// Replace the saved snapshot (best-effort, atomically where possible).
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;
}

/// Snapshot kept as a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotPersistence for JsonFileStore {
    async fn load(&self) -> Result<Snapshot, PersistError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no saved snapshot, starting empty");
                return Ok(Snapshot::empty());
            }
            Err(e) => return Err(e.into()),
        };
        let mut snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        snapshot.precompute_json()?;
        tracing::info!(
            path = %self.path.display(),
            listings = snapshot.len(),
            "loaded saved snapshot"
        );
        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let data = serde_json::to_vec(snapshot)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

// --- Test helper ---
/// In-memory persistence that records every save and can be told to fail.
pub struct MemoryStore {
    pub initial: Snapshot,
    pub saves: std::sync::Mutex<Vec<Snapshot>>,
    pub fail_saves: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_initial(Snapshot::empty())
    }

    pub fn with_initial(initial: Snapshot) -> Self {
        Self {
            initial,
            saves: std::sync::Mutex::new(vec![]),
            fail_saves: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|s| s.len()).unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotPersistence for MemoryStore {
    async fn load(&self) -> Result<Snapshot, PersistError> {
        Ok(self.initial.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PersistError::Other("disk full".into()));
        }
        self.saves
            .lock()
            .map_err(|_| PersistError::Other("saves mutex poisoned".into()))?
            .push(snapshot.clone());
        Ok(())
    }
}
