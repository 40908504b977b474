//! File-backed memory backend.
//!
//! All entries of a database live in one JSON document
//! (`<dir>/<database>.json`). The document is loaded on `connect` and
//! rewritten after every mutation using the temp file + rename pattern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::backends::memory::{list_records, search_records, upsert};
use crate::backends::traits::{
    BackendFactory, ListOptions, MemoryBackend, MemoryRecord, NewMemory, SearchQuery,
    StatsSnapshot, WriteResult,
};
use crate::config::{memlink_home, ConnectionParams};
use crate::error::{MemlinkError, Result};

/// Current on-disk document version.
pub const STORE_VERSION: u32 = 1;

/// Maximum store file size that will be loaded (50 MB).
pub const MAX_STORE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    entries: Vec<MemoryRecord>,
}

/// Loaded state. `None` until `connect` succeeds.
type Entries = Option<HashMap<(String, String), MemoryRecord>>;

/// File-backed memory backend.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<Entries>,
}

impl FileBackend {
    /// Create a backend for the given store file. Nothing is read until `connect`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(None),
        }
    }

    /// Create a backend for `database` inside `dir`.
    ///
    /// Rejects database names that would escape `dir`.
    pub fn for_database(dir: &Path, database: &str) -> Result<Self> {
        let name = database.trim();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.contains("..")
        {
            return Err(MemlinkError::config(format!(
                "invalid database name for file backend: '{}'",
                database
            )));
        }
        Ok(Self::new(dir.join(format!("{}.json", name))))
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "store.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", file_name))
    }

    async fn load(&self) -> Result<HashMap<(String, String), MemoryRecord>> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(MemlinkError::storage(&self.path, e)),
        };

        if metadata.len() > MAX_STORE_SIZE {
            return Err(MemlinkError::connection(format!(
                "store {} is too large ({} bytes, max {} bytes)",
                self.path.display(),
                metadata.len(),
                MAX_STORE_SIZE
            )));
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| MemlinkError::storage(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let document: StoreDocument = serde_json::from_str(&content).map_err(|e| {
            MemlinkError::connection(format!("corrupt store {}: {}", self.path.display(), e))
        })?;
        if document.version > STORE_VERSION {
            return Err(MemlinkError::connection(format!(
                "store {} has unsupported version {}",
                self.path.display(),
                document.version
            )));
        }

        Ok(document
            .entries
            .into_iter()
            .map(|r| ((r.namespace.clone(), r.key.clone()), r))
            .collect())
    }

    /// Write the whole document atomically.
    async fn persist(&self, entries: &HashMap<(String, String), MemoryRecord>) -> Result<()> {
        let mut records: Vec<MemoryRecord> = entries.values().cloned().collect();
        records.sort_by(|a, b| (&a.namespace, &a.key).cmp(&(&b.namespace, &b.key)));
        let document = StoreDocument {
            version: STORE_VERSION,
            entries: records,
        };
        let json = serde_json::to_string_pretty(&document)?;

        let temp_path = self.temp_path();
        {
            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|e| MemlinkError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| MemlinkError::storage(&temp_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| MemlinkError::storage(&temp_path, e))?;
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| MemlinkError::storage(&self.path, e))
    }
}

fn not_connected() -> MemlinkError {
    MemlinkError::backend("file backend is not connected")
}

#[async_trait]
impl MemoryBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn connect(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MemlinkError::connection(format!("{}: {}", parent.display(), e)))?;
        }
        let loaded = self.load().await?;
        *self.entries.write().await = Some(loaded);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.entries.write().await = None;
        Ok(())
    }

    async fn read(&self, namespace: &str, key: &str) -> Result<Option<MemoryRecord>> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_else(not_connected)?;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn write(&self, entry: &NewMemory) -> Result<WriteResult> {
        let mut guard = self.entries.write().await;
        let entries = guard.as_mut().ok_or_else(not_connected)?;
        let mut staged = entries.clone();
        let result = upsert(&mut staged, entry);
        self.persist(&staged).await?;
        *entries = staged;
        Ok(result)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_else(not_connected)?;
        Ok(search_records(entries.values(), query))
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_else(not_connected)?;
        Ok(list_records(entries.values(), options))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut guard = self.entries.write().await;
        let entries = guard.as_mut().ok_or_else(not_connected)?;
        let id = (namespace.to_string(), key.to_string());
        if !entries.contains_key(&id) {
            return Ok(false);
        }
        let mut staged = entries.clone();
        staged.remove(&id);
        self.persist(&staged).await?;
        *entries = staged;
        Ok(true)
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_else(not_connected)?;
        Ok(StatsSnapshot::from_records(entries.values()))
    }
}

/// Factory for the file backend.
///
/// Stores `<database>.json` under `dir`, or under the memlink home directory
/// when no directory was given.
#[derive(Debug, Default, Clone)]
pub struct FileBackendFactory {
    dir: Option<PathBuf>,
}

impl FileBackendFactory {
    /// Factory rooted at the memlink home directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory rooted at a specific directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    fn dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => memlink_home().ok_or_else(|| {
                MemlinkError::config("could not determine memlink home directory")
            }),
        }
    }
}

#[async_trait]
impl BackendFactory for FileBackendFactory {
    async fn create(&self, params: &ConnectionParams) -> Result<Arc<dyn MemoryBackend>> {
        let dir = self.dir()?;
        Ok(Arc::new(FileBackend::for_database(&dir, &params.database)?))
    }
}
