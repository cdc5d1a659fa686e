//! Key-value persistence for suites and settings

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

const STORAGE_FILE: &str = "storage.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing store was disposed underneath us; nothing will succeed until reload
    #[error("Extension context invalidated: {0}")]
    ContextInvalidated(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed storage record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StorageError::ContextInvalidated(_))
    }
}

/// Whole-record key-value persistence. Last writer wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// Stores all records in a single JSON object on disk
pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write of the file within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("Opened storage at {}", root.display());
        Ok(FileStore {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(STORAGE_FILE)
    }
}

fn ensure_root(root: &Path) -> Result<(), StorageError> {
    if !root.is_dir() {
        return Err(StorageError::ContextInvalidated(format!(
            "storage directory {} no longer exists",
            root.display()
        )));
    }
    Ok(())
}

fn read_all(root: &Path) -> Result<Map<String, Value>, StorageError> {
    ensure_root(root)?;
    let path = root.join(STORAGE_FILE);
    if !path.exists() {
        return Ok(Map::new());
    }
    let raw = fs::read_to_string(&path)?;
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn write_all(root: &Path, records: &Map<String, Value>) -> Result<(), StorageError> {
    ensure_root(root)?;
    let json = serde_json::to_string_pretty(records)?;
    let mut tmp = tempfile::NamedTempFile::new_in(root)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(root.join(STORAGE_FILE))
        .map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

/// Run file I/O off the async worker threads
async fn blocking<T, F>(root: &Path, f: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T, StorageError> + Send + 'static,
{
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || f(&root))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = blocking(&self.root, read_all).await?;
        Ok(records.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let key_owned = key.to_string();
        blocking(&self.root, move |root| {
            let mut records = read_all(root)?;
            records.insert(key_owned, value);
            write_all(root, &records)
        })
        .await?;
        info!("Saved '{}' to {}", key, self.path().display());
        Ok(())
    }
}

/// In-process store. Can be invalidated or made to fail writes to exercise
/// the error paths of its callers.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
    invalidated: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later call reports a context invalidation
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Make writes fail with a transient I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.failing_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.invalidated.load(Ordering::SeqCst) {
            return Err(StorageError::ContextInvalidated(
                "memory store disposed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check()?;
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.check()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("write rejected")));
        }
        self.records.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Resolve the data directory, defaulting to `~/.pwgen`
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf, StorageError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    dirs::home_dir()
        .map(|home| home.join(".pwgen"))
        .ok_or_else(|| StorageError::Io(std::io::Error::other("Unable to determine home directory")))
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;
