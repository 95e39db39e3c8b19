//! Key-value document stores
//!
//! Documents are whole JSON texts addressed by key and replaced on every write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Shared reference to a document store
pub type SharedDocumentStore = Arc<dyn DocumentStore>;

/// Persistent key-value contract: one JSON document per key
pub trait DocumentStore: Send + Sync {
    /// Read a document. `Ok(None)` when it has never been written.
    fn read(&self, key: &str) -> PersistenceResult<Option<String>>;

    /// Replace a document atomically
    fn write(&self, key: &str, contents: &str) -> PersistenceResult<()>;
}

/// One `<dir>/<key>.json` file per document
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn shared(self) -> SharedDocumentStore {
        Arc::new(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl DocumentStore for JsonFileStore {
    fn read(&self, key: &str) -> PersistenceResult<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Write to a temp file, then rename over the target
    fn write(&self, key: &str, contents: &str) -> PersistenceResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");

        std::fs::write(&temp_path, contents).map_err(io_error(&temp_path))?;
        std::fs::rename(&temp_path, &path).map_err(io_error(&path))?;
        Ok(())
    }
}

/// In-process store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.documents
            .read()
            .map(|docs| docs.contains_key(key))
            .unwrap_or(false)
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, key: &str) -> PersistenceResult<Option<String>> {
        let docs = self
            .documents
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(docs.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> PersistenceResult<()> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        docs.insert(key.to_string(), contents.to_string());
        Ok(())
    }
}
