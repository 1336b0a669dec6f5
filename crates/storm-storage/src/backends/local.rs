//! Local filesystem storage backend

use crate::config::LocalStorageConfig;
use crate::{FileMetadata, StorageBackend, StorageError, StorageResult, UploadOptions, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::debug;

/// Local filesystem storage backend
#[derive(Debug, Clone)]
pub struct LocalBackend {
    config: LocalStorageConfig,
}

impl LocalBackend {
    /// Create a new local storage backend
    pub fn new(config: LocalStorageConfig) -> Self {
        Self { config }
    }

    /// Get the full filesystem path for a storage path
    pub fn full_path(&self, path: &str) -> PathBuf {
        self.config.root_path.join(sanitize_path(path))
    }

    /// Ensure the parent directory exists.
    ///
    /// Concurrent uploads race on creating the same partition directories;
    /// a directory that appears between the check and the create counts
    /// as success.
    async fn ensure_parent_dir(&self, file_path: &Path) -> StorageResult<()> {
        if !self.config.create_directories {
            return Ok(());
        }

        let parent = match file_path.parent() {
            Some(parent) => parent,
            None => return Ok(()),
        };

        if parent.is_dir() {
            return Ok(());
        }

        if let Err(e) = fs::create_dir_all(parent).await {
            if e.kind() == ErrorKind::AlreadyExists || parent.is_dir() {
                debug!("Directory {} created concurrently", parent.display());
                return Ok(());
            }
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::PermissionDenied,
                format!("Failed to create directory {}: {}", parent.display(), e),
            )));
        }

        #[cfg(unix)]
        if let Some(permissions) = self.config.directory_permissions {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(permissions);
            fs::set_permissions(parent, perms).await.map_err(|e| {
                StorageError::PermissionDenied(format!(
                    "Failed to set directory permissions: {}",
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Apply the configured permissions for the requested visibility
    #[cfg(unix)]
    async fn set_file_permissions(
        &self,
        file_path: &Path,
        visibility: Option<Visibility>,
    ) -> StorageResult<()> {
        let mode = match visibility.unwrap_or(Visibility::Public) {
            Visibility::Public => self.config.file_permissions,
            Visibility::Private => self.config.private_file_permissions,
        };

        if let Some(permissions) = mode {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(permissions);
            fs::set_permissions(file_path, perms).await.map_err(|e| {
                StorageError::PermissionDenied(format!("Failed to set file permissions: {}", e))
            })?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn set_file_permissions(
        &self,
        _file_path: &Path,
        _visibility: Option<Visibility>,
    ) -> StorageResult<()> {
        Ok(())
    }

    fn reject_existing(&self, file_path: &Path, path: &str, options: &Option<UploadOptions>) -> StorageResult<()> {
        if let Some(opts) = options {
            if !opts.overwrite && file_path.exists() {
                return Err(StorageError::Backend(format!("File already exists: {}", path)));
            }
        }
        Ok(())
    }

    async fn read_metadata(&self, file_path: &Path, path: &str) -> StorageResult<FileMetadata> {
        let fs_metadata = fs::metadata(file_path).await?;
        let modified = fs_metadata.modified()?;
        let modified_at: DateTime<Utc> = modified.into();
        let size = fs_metadata.len();

        // Sniff small files, trust the extension for large ones
        let content_type = if size <= 1024 * 1024 {
            let sample = fs::read(file_path).await.unwrap_or_default();
            crate::detect_content_type(path, &sample)
        } else {
            crate::detect_content_type(path, &[])
        };

        let mut metadata = FileMetadata::new(path, size, content_type)
            .with_etag(format!("{}-{}", size, modified_at.timestamp()));
        metadata.modified_at = modified_at;
        Ok(metadata)
    }

    fn relative(&self, path: &Path) -> StorageResult<String> {
        let relative = path
            .strip_prefix(&self.config.root_path)
            .map_err(|e| StorageError::Backend(format!("Path error: {}", e)))?;
        Ok(relative.to_string_lossy().replace('\\', "/"))
    }
}

/// Strip leading slashes and any `.`/`..` components
fn sanitize_path(path: &str) -> PathBuf {
    path.trim_start_matches('/')
        .split('/')
        .filter(|component| !component.is_empty() && *component != "." && *component != "..")
        .collect()
}

fn collect_files<'a>(
    dir: PathBuf,
    recursive: bool,
    found: &'a mut Vec<PathBuf>,
) -> Pin<Box<dyn Future<Output = StorageResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_file() {
                found.push(path);
            } else if file_type.is_dir() && recursive {
                collect_files(path, true, found).await?;
            }
        }

        Ok(())
    })
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn put(
        &self,
        path: &str,
        data: &[u8],
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata> {
        let file_path = self.full_path(path);
        self.reject_existing(&file_path, path, &options)?;
        self.ensure_parent_dir(&file_path).await?;

        fs::write(&file_path, data).await?;

        let visibility = options.as_ref().and_then(|o| o.visibility);
        self.set_file_permissions(&file_path, visibility).await?;

        let content_type = options
            .as_ref()
            .and_then(|o| o.content_type.clone())
            .unwrap_or_else(|| crate::detect_content_type(path, data));

        let mut metadata = self.read_metadata(&file_path, path).await?;
        metadata.content_type = content_type;
        if let Some(opts) = options {
            metadata.metadata = opts.metadata;
        }

        debug!("Stored {} ({} bytes)", path, data.len());
        Ok(metadata)
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>> {
        let file_path = self.full_path(path);

        match fs::read(&file_path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.full_path(path).is_file())
    }

    async fn metadata(&self, path: &str) -> StorageResult<Option<FileMetadata>> {
        let file_path = self.full_path(path);

        if !file_path.is_file() {
            return Ok(None);
        }

        self.read_metadata(&file_path, path).await.map(Some)
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let file_path = self.full_path(path);

        match fs::remove_file(&file_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata> {
        let from_path = self.full_path(from);
        let to_path = self.full_path(to);

        if !from_path.is_file() {
            return Err(StorageError::FileNotFound(from.to_string()));
        }

        self.reject_existing(&to_path, to, &options)?;
        self.ensure_parent_dir(&to_path).await?;

        fs::copy(&from_path, &to_path).await?;

        let visibility = options.as_ref().and_then(|o| o.visibility);
        self.set_file_permissions(&to_path, visibility).await?;

        self.read_metadata(&to_path, to).await
    }

    async fn files(&self, directory: &str) -> StorageResult<Vec<String>> {
        let mut found = Vec::new();
        collect_files(self.full_path(directory), false, &mut found).await?;

        let mut files = found
            .iter()
            .map(|path| self.relative(path))
            .collect::<StorageResult<Vec<_>>>()?;
        files.sort();
        Ok(files)
    }

    async fn all_files(&self, directory: &str) -> StorageResult<Vec<String>> {
        let mut found = Vec::new();
        collect_files(self.full_path(directory), true, &mut found).await?;

        let mut files = found
            .iter()
            .map(|path| self.relative(path))
            .collect::<StorageResult<Vec<_>>>()?;
        files.sort();
        Ok(files)
    }

    async fn delete_directory(&self, directory: &str) -> StorageResult<bool> {
        let dir_path = self.full_path(directory);

        // Never remove the storage root itself
        if dir_path == self.config.root_path {
            return Err(StorageError::PermissionDenied(
                "Refusing to delete the storage root".to_string(),
            ));
        }

        match fs::remove_dir_all(&dir_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn public_url(&self, path: &str) -> StorageResult<String> {
        let relative = sanitize_path(path).to_string_lossy().replace('\\', "/");
        Ok(format!("{}/{}", self.config.url.trim_end_matches('/'), relative))
    }

    fn local_root(&self) -> Option<&Path> {
        Some(self.config.root_path.as_path())
    }
}
