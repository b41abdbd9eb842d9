//! Durable object storage behind the registries
//!
//! Registries serve every request from memory. The store only exists so a
//! restarted process can rebuild them, so all writes are best-effort: the
//! registries log a failed write and carry on.
//!
//! Objects are addressed by slash-separated names such as
//! `policies/<id>.json`. Use [`object_name`] to build them; it escapes ids so a
//! hostile id can never address anything outside its prefix.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid object name: {0}")]
    InvalidName(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted-state interface consumed by the registries
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Create or overwrite an object
    async fn write_object(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Read a whole object
    async fn read_object(&self, name: &str) -> StorageResult<Vec<u8>>;

    /// Names of all objects under `prefix` (a top-level directory such as `policies`)
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete_object(&self, name: &str) -> StorageResult<()>;

    /// Delete everything
    async fn delete_all_objects(&self) -> StorageResult<()>;
}

/// Build `<prefix>/<escaped id>.json`
///
/// Bytes outside `[A-Za-z0-9._-]` are written as `%XX`.
pub fn object_name(prefix: &str, id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                escaped.push(byte as char)
            }
            other => escaped.push_str(&format!("%{:02X}", other)),
        }
    }
    format!("{}/{}.json", prefix, escaped)
}

/// One file per object below a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        let mut path = self.root.clone();
        for component in name.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(StorageError::InvalidName(name.to_string()));
            }
            path.push(component);
        }
        Ok(path)
    }
}

#[async_trait]
impl DataStore for FileStore {
    async fn write_object(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crash never leaves a truncated record behind
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(object = name, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn read_object(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.path_for(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.ends_with(".json") {
                names.push(format!("{}/{}", prefix, file_name));
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all_objects(&self) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

/// Process-local store, used when no database directory is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().contains_key(name)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn write_object(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        self.objects.lock().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_object(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = format!("{}/", prefix);
        Ok(self
            .objects
            .lock()
            .keys()
            .filter(|name| name.starts_with(&dir))
            .cloned()
            .collect())
    }

    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        self.objects.lock().remove(name);
        Ok(())
    }

    async fn delete_all_objects(&self) -> StorageResult<()> {
        self.objects.lock().clear();
        Ok(())
    }
}
