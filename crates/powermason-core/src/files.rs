//! Uploaded file storage.
//!
//! Paths are relative to the store root (`project_files/contract.pdf`) and
//! are what gets persisted on project rows.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::PowermasonError;

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),
}

impl From<FileStoreError> for PowermasonError {
    fn from(e: FileStoreError) -> Self {
        match e {
            FileStoreError::NotFound(p) => PowermasonError::NotFound(format!("file {p}")),
            FileStoreError::InvalidPath(p) => {
                PowermasonError::Validation(format!("invalid file path: {p}"))
            }
            FileStoreError::AlreadyExists(p) => {
                PowermasonError::Conflict(format!("file {p} already exists"))
            }
            FileStoreError::Io(e) => PowermasonError::Internal(e.into()),
        }
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Write `content` at `path`, returning the stored relative path.
    /// Never replaces an existing file.
    async fn save(&self, path: &str, content: &[u8]) -> Result<String, FileStoreError>;

    async fn open(&self, path: &str) -> Result<Vec<u8>, FileStoreError>;

    async fn exists(&self, path: &str) -> Result<bool, FileStoreError>;

    async fn delete(&self, path: &str) -> Result<(), FileStoreError>;
}

/// An uploaded file not yet placed in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub name: String,
    pub content: Vec<u8>,
}

const MAX_NAME_ATTEMPTS: usize = 100;

/// `plan.pdf` -> `plan_2.pdf`.
fn numbered_name(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{name}_{n}"),
    }
}

/// Save under `dir`, numbering the name until it does not collide with an
/// existing file.
pub async fn save_unique(
    files: &dyn FileStore,
    dir: &str,
    name: &str,
    content: &[u8],
) -> Result<String, FileStoreError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = match attempt {
            0 => name.to_string(),
            n => numbered_name(name, n),
        };
        match files.save(&format!("{dir}/{candidate}"), content).await {
            Err(FileStoreError::AlreadyExists(_)) => continue,
            other => return other,
        }
    }
    Err(FileStoreError::AlreadyExists(format!("{dir}/{name}")))
}

/// Reject absolute paths and `..` so every file stays under the root.
fn checked_relative(path: &str) -> Result<&Path, FileStoreError> {
    let p = Path::new(path);
    let clean = !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if clean {
        Ok(p)
    } else {
        Err(FileStoreError::InvalidPath(path.to_string()))
    }
}

/// Keep only the final path component of an uploaded file name.
pub fn upload_name(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
}

/// Filesystem store rooted at the media directory.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, FileStoreError> {
        Ok(self.root.join(checked_relative(path)?))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, path: &str, content: &[u8]) -> Result<String, FileStoreError> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(FileStoreError::AlreadyExists(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content).await?;
        file.flush().await?;
        tracing::debug!(path, bytes = content.len(), "stored file");
        Ok(path.to_string())
    }

    async fn open(&self, path: &str) -> Result<Vec<u8>, FileStoreError> {
        let full = self.full_path(path)?;
        if !tokio::fs::try_exists(&full).await? {
            return Err(FileStoreError::NotFound(path.to_string()));
        }
        Ok(tokio::fs::read(full).await?)
    }

    async fn exists(&self, path: &str) -> Result<bool, FileStoreError> {
        let full = self.full_path(path)?;
        Ok(tokio::fs::try_exists(full).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        let full = self.full_path(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and the memory backend.
#[derive(Default, Clone)]
pub struct MemoryFileStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn save(&self, path: &str, content: &[u8]) -> Result<String, FileStoreError> {
        checked_relative(path)?;
        let mut files = self.files.write().await;
        if files.contains_key(path) {
            return Err(FileStoreError::AlreadyExists(path.to_string()));
        }
        files.insert(path.to_string(), content.to_vec());
        Ok(path.to_string())
    }

    async fn open(&self, path: &str) -> Result<Vec<u8>, FileStoreError> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, FileStoreError> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<(), FileStoreError> {
        self.files
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FileStoreError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());

        let stored = store
            .save("project_files/contract.pdf", b"signed")
            .await
            .unwrap();
        assert_eq!(stored, "project_files/contract.pdf");
        assert!(store.exists(&stored).await.unwrap());
        assert_eq!(store.open(&stored).await.unwrap(), b"signed");
        assert!(temp_dir.path().join("project_files/contract.pdf").exists());
    }

    #[tokio::test]
    async fn local_store_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());
        assert!(!store.exists("nope.txt").await.unwrap());
        assert!(matches!(
            store.open("nope.txt").await,
            Err(FileStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());
        assert!(matches!(
            store.save("../outside.txt", b"x").await,
            Err(FileStoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store.save("/etc/passwd", b"x").await,
            Err(FileStoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryFileStore::new();
        store.save("a/b.txt", b"hi").await.unwrap();
        assert!(store.exists("a/b.txt").await.unwrap());
        assert_eq!(store.open("a/b.txt").await.unwrap(), b"hi");
        assert!(!store.exists("a/c.txt").await.unwrap());
    }

    #[tokio::test]
    async fn save_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());
        store.save("p/contract.pdf", b"first").await.unwrap();
        assert!(matches!(
            store.save("p/contract.pdf", b"second").await,
            Err(FileStoreError::AlreadyExists(_))
        ));
        assert_eq!(store.open("p/contract.pdf").await.unwrap(), b"first");

        let memory = MemoryFileStore::new();
        memory.save("p/contract.pdf", b"first").await.unwrap();
        assert!(memory.save("p/contract.pdf", b"second").await.is_err());
        assert_eq!(memory.open("p/contract.pdf").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn save_unique_numbers_colliding_names() {
        let store = MemoryFileStore::new();
        let a = save_unique(&store, "project_files/7", "plan.pdf", b"a").await.unwrap();
        let b = save_unique(&store, "project_files/7", "plan.pdf", b"b").await.unwrap();
        let c = save_unique(&store, "project_files/7", "README", b"c").await.unwrap();
        let d = save_unique(&store, "project_files/7", "README", b"d").await.unwrap();
        assert_eq!(a, "project_files/7/plan.pdf");
        assert_eq!(b, "project_files/7/plan_1.pdf");
        assert_eq!(d, "project_files/7/README_1");
        assert_eq!(store.open(&a).await.unwrap(), b"a");
        assert_eq!(store.open(&b).await.unwrap(), b"b");
        assert_eq!(store.open(&c).await.unwrap(), b"c");
    }

    #[tokio::test]
    async fn delete_removes_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(temp_dir.path());
        store.save("x/y.txt", b"1").await.unwrap();
        store.delete("x/y.txt").await.unwrap();
        assert!(!store.exists("x/y.txt").await.unwrap());
        assert!(matches!(
            store.delete("x/y.txt").await,
            Err(FileStoreError::NotFound(_))
        ));
    }

    #[test]
    fn upload_name_strips_directories() {
        assert_eq!(upload_name("../../evil.sh"), Some("evil.sh"));
        assert_eq!(upload_name("plan.pdf"), Some("plan.pdf"));
        assert_eq!(upload_name(""), None);
    }
}
