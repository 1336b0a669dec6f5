#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storm_cache::{CacheConfig, MemoryBackend};
use storm_files::{FileService, FilesConfig, FILE_MODEL};
use storm_orm::{ModelSchema, RelationDefinition, Storm};
use storm_storage::{
    FileMetadata, LocalBackend, LocalStorageConfig, StorageBackend, StorageResult, UploadOptions,
};
use tempfile::TempDir;

/// Local storage that counts existence checks
pub struct CountingStorage {
    inner: LocalBackend,
    exists_calls: AtomicUsize,
}

impl CountingStorage {
    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for CountingStorage {
    async fn put(&self, path: &str, data: &[u8], options: Option<UploadOptions>) -> StorageResult<FileMetadata> {
        self.inner.put(path, data, options).await
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>> {
        self.inner.get(path).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(path).await
    }

    async fn metadata(&self, path: &str) -> StorageResult<Option<FileMetadata>> {
        self.inner.metadata(path).await
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        self.inner.delete(path).await
    }

    async fn copy(&self, from: &str, to: &str, options: Option<UploadOptions>) -> StorageResult<FileMetadata> {
        self.inner.copy(from, to, options).await
    }

    async fn files(&self, directory: &str) -> StorageResult<Vec<String>> {
        self.inner.files(directory).await
    }

    async fn all_files(&self, directory: &str) -> StorageResult<Vec<String>> {
        self.inner.all_files(directory).await
    }

    async fn delete_directory(&self, directory: &str) -> StorageResult<bool> {
        self.inner.delete_directory(directory).await
    }

    async fn public_url(&self, path: &str) -> StorageResult<String> {
        self.inner.public_url(path).await
    }

    fn local_root(&self) -> Option<&Path> {
        self.inner.local_root()
    }
}

pub struct Fixture {
    pub storm: Storm,
    pub files: Arc<FileService>,
    pub storage: Arc<CountingStorage>,
    pub root: TempDir,
}

/// A product model with public, protected and non-dependent attachments
pub fn fixture() -> Fixture {
    fixture_with(FilesConfig::default())
}

pub fn fixture_with(config: FilesConfig) -> Fixture {
    let root = TempDir::new().unwrap();
    let storage = Arc::new(CountingStorage {
        inner: LocalBackend::new(LocalStorageConfig::default().with_root_path(root.path())),
        exists_calls: AtomicUsize::new(0),
    });

    let storm = Storm::memory();
    storm
        .register(
            ModelSchema::new("Product", "products")
                .relation(RelationDefinition::attach_many("photos", FILE_MODEL))
                .relation(RelationDefinition::attach_one("manual", FILE_MODEL).public(false))
                .relation(RelationDefinition::attach_many("documents", FILE_MODEL).dependent(false)),
        )
        .unwrap();

    let files = FileService::install(
        &storm,
        storage.clone(),
        Arc::new(MemoryBackend::new(CacheConfig::default())),
        config,
    )
    .unwrap();

    Fixture {
        storm,
        files,
        storage,
        root,
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([30, 144, 255, 255]));
    let mut data = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)
        .unwrap();
    data
}
