//! Identity and history storage backed by memory or the filesystem.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ringer_core::HistoryRecord;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::host::{HistorySink, HostError, HostResult, IdentityStore};

// ============================================================================
// Identity Store
// ============================================================================

#[derive(Default)]
pub struct MemoryIdentityStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with one entry.
    pub fn with_entry(key: &str, blob: Vec<u8>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.to_string(), blob);
        Self {
            entries: Mutex::new(entries),
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, blob: Vec<u8>) -> HostResult<()> {
        self.entries.lock().await.insert(key.to_string(), blob);
        Ok(())
    }
}

/// One file per key (`<dir>/<key>.json`).
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> HostResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HostError::Storage(format!("invalid key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::Storage(format!("{}: {e}", path.display()))),
        }
    }

    async fn set(&self, key: &str, blob: Vec<u8>) -> HostResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HostError::Storage(format!("{}: {e}", self.dir.display())))?;

        // Write-then-rename so a crash never leaves a truncated blob
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &blob)
            .await
            .map_err(|e| HostError::Storage(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| HostError::Storage(format!("{}: {e}", path.display())))?;

        debug!(key, path = %path.display(), "Identity blob stored");
        Ok(())
    }
}

// ============================================================================
// History Sink
// ============================================================================

#[derive(Default)]
pub struct MemoryHistorySink {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl HistorySink for MemoryHistorySink {
    async fn append(&self, record: HistoryRecord) -> HostResult<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlHistorySink {
    path: PathBuf,
    // Serializes appends from concurrent callers
    write_lock: Mutex<()>,
}

impl JsonlHistorySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back. Lines that fail to parse are skipped.
    pub async fn read_all(&self) -> HostResult<Vec<HistoryRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HostError::Storage(format!("{}: {e}", self.path.display()))),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable history line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl HistorySink for JsonlHistorySink {
    async fn append(&self, record: HistoryRecord) -> HostResult<()> {
        let mut line = serde_json::to_vec(&record).map_err(HostError::storage)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HostError::Storage(format!("{}: {e}", parent.display())))?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| HostError::Storage(format!("{}: {e}", self.path.display())))?;
        file.write_all(&line).await.map_err(HostError::storage)?;
        file.flush().await.map_err(HostError::storage)?;
        Ok(())
    }
}
