//! Blob store for uploaded file contents
//!
//! Blobs are addressed by an opaque key (the file's stored name), never by
//! the user supplied name.

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Streamed blob contents
pub type BlobStream = BoxStream<'static, std::io::Result<Bytes>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, key: &str, bytes: &[u8]) -> AppResult<()>;

    async fn read(&self, key: &str) -> AppResult<Vec<u8>>;

    async fn stream(&self, key: &str) -> AppResult<BlobStream>;

    /// Removing a missing blob is not an error
    async fn delete(&self, key: &str) -> AppResult<()>;

    async fn exists(&self, key: &str) -> AppResult<bool>;
}

/// Check if a filename is safe (no path separators)
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    // Windows restricted characters
    if name.chars().any(|c| "<>:\"/\\|?*".contains(c)) {
        return false;
    }

    if name.chars().any(|c| c.is_control()) {
        return false;
    }

    // ".", "..", "..."
    if name.chars().all(|c| c == '.') {
        return false;
    }

    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(c)), None) => c == name,
        _ => false,
    }
}

/// Blobs as plain files under one root directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::Storage(format!("Failed to create blob root {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        if !is_safe_filename(key) {
            return Err(AppError::Validation(format!("invalid blob key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

fn not_found_or_storage(e: std::io::Error, key: &str) -> AppError {
    if e.kind() == std::io::ErrorKind::NotFound {
        AppError::NotFound(format!("blob {}", key))
    } else {
        AppError::Storage(format!("Failed to read blob {}: {}", key, e))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> AppResult<()> {
        let path = self.resolve(key)?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write blob {}: {}", key, e)))?;
        debug!(key, bytes = bytes.len(), "Wrote blob");
        Ok(())
    }

    async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(|e| not_found_or_storage(e, key))
    }

    async fn stream(&self, key: &str) -> AppResult<BlobStream> {
        let path = self.resolve(key)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_storage(e, key))?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete blob {}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("test.txt"));
        assert!(is_safe_filename("rapport 2024 (v2).docx"));
        assert!(is_safe_filename(".hidden"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename("../secret"));
        assert!(!is_safe_filename("a/b.txt"));
        assert!(!is_safe_filename("a\\b.txt"));
        assert!(!is_safe_filename("bad\u{0}name"));
    }

    #[tokio::test]
    async fn test_local_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs")).await.unwrap();

        assert!(!store.exists("a.pdf").await.unwrap());
        store.save("a.pdf", b"hello").await.unwrap();
        assert!(store.exists("a.pdf").await.unwrap());
        assert_eq!(store.read("a.pdf").await.unwrap(), b"hello");

        let chunks: Vec<_> = store.stream("a.pdf").await.unwrap().collect().await;
        let joined: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap().to_vec()).collect();
        assert_eq!(joined, b"hello");

        store.delete("a.pdf").await.unwrap();
        assert!(!store.exists("a.pdf").await.unwrap());
        // idempotent
        store.delete("a.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path()).await.unwrap();
        assert!(matches!(store.read("nope.txt").await, Err(AppError::NotFound(_))));
        assert!(matches!(store.save("../x", b"").await, Err(AppError::Validation(_))));
    }
}
