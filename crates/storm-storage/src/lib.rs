//! # storm-storage
//!
//! Storage abstraction consumed by the Storm attachment layer.
//!
//! ## Features
//!
//! - **Multi-backend support**: local filesystem and AWS S3 (`aws-s3` feature)
//! - **Visibility**: files are written public or private
//! - **Directory operations**: list files (flat or recursive) and remove directories
//! - **Async-first**: every backend operation is an `async fn`
//!
//! ## Quick Start
//!
//! ```rust
//! use storm_storage::{LocalBackend, LocalStorageConfig, StorageBackend, UploadOptions};
//!
//! # tokio_test::block_on(async {
//! let root = tempfile::tempdir().unwrap();
//! let storage = LocalBackend::new(LocalStorageConfig::default().with_root_path(root.path()));
//!
//! storage.put("documents/hello.txt", b"Hello, World!", Some(UploadOptions::new().public())).await.unwrap();
//!
//! let retrieved = storage.get("documents/hello.txt").await.unwrap();
//! assert_eq!(retrieved.unwrap().as_ref(), b"Hello, World!");
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub mod backends;
pub mod config;

pub use backends::*;
pub use config::*;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(u64, u64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// File visibility on the storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_public(is_public: bool) -> Self {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// File metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File path/key
    pub path: String,

    /// File size in bytes
    pub size: u64,

    /// MIME type
    pub content_type: String,

    /// File modification timestamp
    pub modified_at: DateTime<Utc>,

    /// ETag/version identifier
    pub etag: Option<String>,

    /// Custom metadata
    pub metadata: HashMap<String, String>,
}

impl FileMetadata {
    /// Create new file metadata
    pub fn new(path: impl Into<String>, size: u64, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size,
            content_type: content_type.into(),
            modified_at: Utc::now(),
            etag: None,
            metadata: HashMap::new(),
        }
    }

    /// Set ETag
    pub fn with_etag(mut self, etag: String) -> Self {
        self.etag = Some(etag);
        self
    }
}

/// File upload options
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Content type override
    pub content_type: Option<String>,

    /// Public or private
    pub visibility: Option<Visibility>,

    /// Custom metadata
    pub metadata: HashMap<String, String>,

    /// Whether to overwrite existing file
    pub overwrite: bool,
}

impl UploadOptions {
    /// Create new upload options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set content type
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Shorthand for public visibility with overwrite allowed
    pub fn public(self) -> Self {
        self.visibility(Visibility::Public).overwrite()
    }

    /// Add metadata
    pub fn metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Allow overwriting existing files
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

/// Core storage backend trait that all storage implementations must implement.
///
/// Paths are relative to the backend root (bucket prefix or local root
/// directory) and always use `/` as separator.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a file
    async fn put(
        &self,
        path: &str,
        data: &[u8],
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata>;

    /// Retrieve a file
    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>>;

    /// Check if a file exists
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Get file metadata
    async fn metadata(&self, path: &str) -> StorageResult<Option<FileMetadata>>;

    /// Delete a file
    async fn delete(&self, path: &str) -> StorageResult<bool>;

    /// Copy a file
    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata>;

    /// Files directly inside `directory`
    async fn files(&self, directory: &str) -> StorageResult<Vec<String>>;

    /// Files inside `directory` and all of its subdirectories
    async fn all_files(&self, directory: &str) -> StorageResult<Vec<String>>;

    /// Remove a directory and everything below it
    async fn delete_directory(&self, directory: &str) -> StorageResult<bool>;

    /// Generate a public URL (if supported)
    async fn public_url(&self, path: &str) -> StorageResult<String>;

    /// Root directory on the local filesystem, for backends that have one
    fn local_root(&self) -> Option<&Path> {
        None
    }

    /// Delete multiple files
    async fn delete_many(&self, paths: &[&str]) -> StorageResult<Vec<String>> {
        let mut deleted = Vec::new();
        for path in paths {
            if self.delete(path).await? {
                deleted.push(path.to_string());
            }
        }
        Ok(deleted)
    }

    /// File size in bytes
    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.metadata(path)
            .await?
            .map(|m| m.size)
            .ok_or_else(|| StorageError::FileNotFound(path.to_string()))
    }

    /// MIME type of a stored file
    async fn mime_type(&self, path: &str) -> StorageResult<String> {
        self.metadata(path)
            .await?
            .map(|m| m.content_type)
            .ok_or_else(|| StorageError::FileNotFound(path.to_string()))
    }

    /// Last modification time of a stored file
    async fn last_modified(&self, path: &str) -> StorageResult<DateTime<Utc>> {
        self.metadata(path)
            .await?
            .map(|m| m.modified_at)
            .ok_or_else(|| StorageError::FileNotFound(path.to_string()))
    }
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    async fn put(
        &self,
        path: &str,
        data: &[u8],
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata> {
        (**self).put(path, data, options).await
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>> {
        (**self).get(path).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        (**self).exists(path).await
    }

    async fn metadata(&self, path: &str) -> StorageResult<Option<FileMetadata>> {
        (**self).metadata(path).await
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        (**self).delete(path).await
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata> {
        (**self).copy(from, to, options).await
    }

    async fn files(&self, directory: &str) -> StorageResult<Vec<String>> {
        (**self).files(directory).await
    }

    async fn all_files(&self, directory: &str) -> StorageResult<Vec<String>> {
        (**self).all_files(directory).await
    }

    async fn delete_directory(&self, directory: &str) -> StorageResult<bool> {
        (**self).delete_directory(directory).await
    }

    async fn public_url(&self, path: &str) -> StorageResult<String> {
        (**self).public_url(path).await
    }

    fn local_root(&self) -> Option<&Path> {
        (**self).local_root()
    }

    async fn delete_many(&self, paths: &[&str]) -> StorageResult<Vec<String>> {
        (**self).delete_many(paths).await
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        (**self).size(path).await
    }

    async fn mime_type(&self, path: &str) -> StorageResult<String> {
        (**self).mime_type(path).await
    }

    async fn last_modified(&self, path: &str) -> StorageResult<DateTime<Utc>> {
        (**self).last_modified(path).await
    }
}

/// Detect a content type from the path extension, then from magic numbers
pub fn detect_content_type(path: &str, data: &[u8]) -> String {
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        let known = match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(mime::IMAGE_JPEG),
            "png" => Some(mime::IMAGE_PNG),
            "gif" => Some(mime::IMAGE_GIF),
            "bmp" => Some(mime::IMAGE_BMP),
            "svg" => Some(mime::IMAGE_SVG),
            "pdf" => Some(mime::APPLICATION_PDF),
            "txt" => Some(mime::TEXT_PLAIN),
            "csv" => Some(mime::TEXT_CSV),
            "json" => Some(mime::APPLICATION_JSON),
            "xml" => Some(mime::TEXT_XML),
            "html" | "htm" => Some(mime::TEXT_HTML),
            "css" => Some(mime::TEXT_CSS),
            "js" => Some(mime::APPLICATION_JAVASCRIPT),
            _ => None,
        };
        if let Some(known) = known {
            return known.essence_str().to_string();
        }
        if ext.eq_ignore_ascii_case("webp") {
            return "image/webp".to_string();
        }
    }

    // Simple magic number detection
    if data.len() >= 4 {
        match &data[..4] {
            [0xFF, 0xD8, 0xFF, _] => return "image/jpeg".to_string(),
            [0x89, 0x50, 0x4E, 0x47] => return "image/png".to_string(),
            [0x47, 0x49, 0x46, 0x38] => return "image/gif".to_string(),
            [0x52, 0x49, 0x46, 0x46] if data.len() >= 12 && &data[8..12] == b"WEBP" => {
                return "image/webp".to_string()
            }
            [0x25, 0x50, 0x44, 0x46] => return "application/pdf".to_string(),
            _ => {}
        }
    }

    mime::APPLICATION_OCTET_STREAM.essence_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type("test.jpg", &[]), "image/jpeg");
        assert_eq!(detect_content_type("test.PNG", &[]), "image/png");
        assert_eq!(detect_content_type("test.pdf", &[]), "application/pdf");
        assert_eq!(detect_content_type("photo.webp", &[]), "image/webp");

        let jpeg_data = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(detect_content_type("unknown", &jpeg_data), "image/jpeg");

        let png_data = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_content_type("unknown", &png_data), "image/png");

        assert_eq!(
            detect_content_type("unknown", &[0x00, 0x01, 0x02, 0x03]),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_visibility_from_flag() {
        assert_eq!(Visibility::from_public(true), Visibility::Public);
        assert_eq!(Visibility::from_public(false), Visibility::Private);

        let options = UploadOptions::new().visibility(Visibility::Private);
        assert_eq!(options.visibility, Some(Visibility::Private));
        assert!(!options.overwrite);
    }
}
