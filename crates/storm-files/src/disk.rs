//! Storage indirection for attached files
//!
//! Every storage call made on behalf of a file goes through `Disk`. When the
//! backend keeps its files under a local root, reads go straight to the
//! filesystem below that root; otherwise the call is passed to the backend
//! unchanged.

use crate::error::{FilesError, FilesResult};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storm_storage::{StorageBackend, UploadOptions, Visibility};
use tracing::trace;

#[derive(Clone)]
pub struct Disk {
    storage: Arc<dyn StorageBackend>,
}

impl Disk {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn is_local(&self) -> bool {
        self.storage.local_root().is_some()
    }

    /// Absolute filesystem path of a storage path, for local disks
    pub fn local_path(&self, path: &str) -> Option<PathBuf> {
        self.storage
            .local_root()
            .map(|root| root.join(path.trim_start_matches('/')))
    }

    pub async fn exists(&self, path: &str) -> FilesResult<bool> {
        trace!("disk exists {}", path);
        Ok(self.storage.exists(path).await?)
    }

    pub async fn get(&self, path: &str) -> FilesResult<Option<Bytes>> {
        if let Some(local) = self.local_path(path) {
            return match tokio::fs::read(&local).await {
                Ok(data) => Ok(Some(Bytes::from(data))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            };
        }
        Ok(self.storage.get(path).await?)
    }

    pub async fn put(&self, path: &str, data: &[u8], visibility: Visibility) -> FilesResult<()> {
        let options = UploadOptions::new().visibility(visibility).overwrite();
        self.storage.put(path, data, Some(options)).await?;
        Ok(())
    }

    /// Publish a file from the local filesystem
    pub async fn put_file(&self, path: &str, source: &Path, visibility: Visibility) -> FilesResult<()> {
        let data = tokio::fs::read(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FilesError::NotFound(source.display().to_string())
            } else {
                e.into()
            }
        })?;
        self.put(path, &data, visibility).await
    }

    pub async fn copy(&self, from: &str, to: &str, visibility: Visibility) -> FilesResult<()> {
        let options = UploadOptions::new().visibility(visibility).overwrite();
        self.storage.copy(from, to, Some(options)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> FilesResult<bool> {
        Ok(self.storage.delete(path).await?)
    }

    pub async fn delete_many(&self, paths: &[&str]) -> FilesResult<Vec<String>> {
        Ok(self.storage.delete_many(paths).await?)
    }

    pub async fn size(&self, path: &str) -> FilesResult<u64> {
        if let Some(local) = self.local_path(path) {
            return Ok(tokio::fs::metadata(&local).await?.len());
        }
        Ok(self.storage.size(path).await?)
    }

    pub async fn mime_type(&self, path: &str) -> FilesResult<String> {
        Ok(self.storage.mime_type(path).await?)
    }

    pub async fn last_modified(&self, path: &str) -> FilesResult<chrono::DateTime<chrono::Utc>> {
        Ok(self.storage.last_modified(path).await?)
    }

    pub async fn files(&self, directory: &str) -> FilesResult<Vec<String>> {
        Ok(self.storage.files(directory).await?)
    }

    pub async fn all_files(&self, directory: &str) -> FilesResult<Vec<String>> {
        Ok(self.storage.all_files(directory).await?)
    }

    /// Remove a directory that holds no files.
    ///
    /// Local directories are removed with `remove_dir`, which refuses to
    /// touch a non-empty directory.
    pub async fn delete_empty_directory(&self, directory: &str) -> FilesResult<bool> {
        if let Some(local) = self.local_path(directory) {
            return match tokio::fs::remove_dir(&local).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            };
        }
        if !self.storage.all_files(directory).await?.is_empty() {
            return Ok(false);
        }
        Ok(self.storage.delete_directory(directory).await?)
    }
}

impl std::fmt::Debug for Disk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disk")
            .field("local_root", &self.storage.local_root())
            .finish()
    }
}
