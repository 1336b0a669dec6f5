//! Attached files
//!
//! `FileService` builds `File` records from uploads, local paths, raw data,
//! URLs and existing storage paths. The bytes are staged on the record and
//! written to the disk when the record is saved (see `observer`). Once
//! stored, a file is addressed by its disk name: the storage path and the
//! URL are both derived from it and from the visibility flag.

use crate::config::FilesConfig;
use crate::disk::Disk;
use crate::error::{FilesError, FilesResult};
use crate::existence::ExistenceCache;
use crate::mime_types::{extension_for_mime, is_image_extension, mime_for_extension};
use crate::observer::FileObserver;
use crate::partition::{extension_of, generate_disk_name, partition_directory};
use crate::schema::{
    file_schema, CONTENT_TYPE, DATA, DESCRIPTION, DISK_NAME, FILE_MODEL, FILE_NAME, FILE_SIZE, SORT_ORDER, TITLE,
};
use crate::thumbnail::{self, thumb_file_name, thumb_prefix, ThumbOptions};
use bytes::Bytes;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storm_cache::CacheBackend;
use storm_orm::{Record, Storm, IS_PUBLIC};
use storm_storage::{detect_content_type, StorageBackend, Visibility};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use url::Url;

/// A file received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Bytes waiting to be written when the record is saved
#[derive(Debug)]
pub(crate) enum StagedSource {
    Data(Bytes),
    Local(PathBuf),
    /// Removed from the filesystem when dropped
    Temp(NamedTempFile),
    Storage(String),
}

/// Owns the disk, the existence cache and the `File` model registration
pub struct FileService {
    storm: Storm,
    disk: Disk,
    existence: ExistenceCache,
    config: FilesConfig,
    http: reqwest::Client,
}

impl FileService {
    /// Register the `File` model and its observer on `storm`
    pub fn install(
        storm: &Storm,
        storage: Arc<dyn StorageBackend>,
        cache: Arc<dyn CacheBackend>,
        config: FilesConfig,
    ) -> FilesResult<Arc<Self>> {
        storm.register(file_schema(&config))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(*config.get_http_timeout_secs()))
            .build()?;

        let service = Arc::new(Self {
            storm: storm.clone(),
            disk: Disk::new(storage),
            existence: ExistenceCache::new(cache),
            config,
            http,
        });
        storm.observe(FILE_MODEL, Arc::new(FileObserver::new(&service)));
        Ok(service)
    }

    pub fn storm(&self) -> &Storm {
        &self.storm
    }

    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    pub fn existence(&self) -> &ExistenceCache {
        &self.existence
    }

    pub fn config(&self) -> &FilesConfig {
        &self.config
    }

    /// Thumbnail options carrying the configured defaults
    pub fn thumb_defaults(&self) -> ThumbOptions {
        ThumbOptions::new()
            .quality(*self.config.get_thumb_quality())
            .sharpen(*self.config.get_thumb_sharpen())
            .interlace(*self.config.get_thumb_interlace())
    }

    /// Cached existence check of a storage path
    pub async fn has_file(&self, path: &str) -> FilesResult<bool> {
        self.existence.has_file(&self.disk, path).await
    }

    pub fn wrap(self: &Arc<Self>, record: Record) -> AttachedFile {
        AttachedFile {
            record,
            service: self.clone(),
        }
    }

    /// Empty, unsaved file
    pub fn new_file(self: &Arc<Self>) -> FilesResult<AttachedFile> {
        Ok(self.wrap(self.storm.new_record(FILE_MODEL)?))
    }

    pub async fn find(self: &Arc<Self>, id: impl Into<Value>) -> FilesResult<Option<AttachedFile>> {
        Ok(self.storm.find(FILE_MODEL, id).await?.map(|record| self.wrap(record)))
    }

    /// File from an upload; the bytes are written on save
    pub async fn from_post(self: &Arc<Self>, upload: UploadedFile) -> FilesResult<AttachedFile> {
        let size = upload.data.len() as u64;
        self.check_size(size)?;
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| detect_content_type(&upload.file_name, &upload.data));

        let file = self.new_file()?;
        file.describe(&upload.file_name, size, &content_type);
        file.record.insert_extension(StagedSource::Data(upload.data));
        Ok(file)
    }

    /// File from a path on the local filesystem
    pub async fn from_file(self: &Arc<Self>, path: impl AsRef<Path>) -> FilesResult<AttachedFile> {
        let path = path.as_ref();
        let file = self.new_file()?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| FilesError::Invalid(format!("{} has no file name", path.display())))?;
        self.describe_local(&file.record, path, file_name).await?;
        file.record.insert_extension(StagedSource::Local(path.to_path_buf()));
        Ok(file)
    }

    /// File from raw bytes. The data goes through a temporary file that is
    /// removed once the record is saved or dropped.
    pub async fn from_data(self: &Arc<Self>, data: impl Into<Bytes>, file_name: &str) -> FilesResult<AttachedFile> {
        let data = data.into();
        self.check_size(data.len() as u64)?;

        let mut builder = tempfile::Builder::new();
        let suffix = extension_of(file_name).map(|ext| format!(".{}", ext));
        if let Some(suffix) = &suffix {
            builder.suffix(suffix);
        }
        let temp = builder.prefix("storm-upload-").tempfile()?;
        tokio::fs::write(temp.path(), &data).await?;

        let file = self.new_file()?;
        self.describe_local(&file.record, temp.path(), file_name).await?;
        file.record.insert_extension(StagedSource::Temp(temp));
        Ok(file)
    }

    /// File downloaded from a URL. Anything but a 200 response fails.
    pub async fn from_url(self: &Arc<Self>, url: &str) -> FilesResult<AttachedFile> {
        let parsed = Url::parse(url)?;
        let response = self.http.get(parsed.clone()).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(FilesError::RemoteStatus {
                url: url.to_string(),
                status,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let data = response.bytes().await?;

        let mut file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if extension_of(&file_name).is_none() {
            if let Some(ext) = content_type.as_deref().and_then(extension_for_mime) {
                file_name = format!("{}.{}", file_name, ext);
            }
        }

        debug!("downloaded {} ({} bytes) as {}", url, data.len(), file_name);
        let file = self.from_data(data, &file_name).await?;
        if let Some(content_type) = content_type {
            if let Ok(parsed) = content_type.parse::<mime::Mime>() {
                file.record.set(CONTENT_TYPE, parsed.essence_str());
            }
        }
        Ok(file)
    }

    /// File copied from a path already on the disk
    pub async fn from_storage(self: &Arc<Self>, path: &str) -> FilesResult<AttachedFile> {
        if !self.disk.exists(path).await? {
            return Err(FilesError::NotFound(path.to_string()));
        }
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let size = self.disk.size(path).await?;
        let content_type = match self.disk.mime_type(path).await {
            Ok(content_type) => content_type,
            Err(_) => mime_for_extension(&extension_of(file_name).unwrap_or_default()).to_string(),
        };

        let file = self.new_file()?;
        file.describe(file_name, size, &content_type);
        file.record.insert_extension(StagedSource::Storage(path.to_string()));
        Ok(file)
    }

    fn check_size(&self, size: u64) -> FilesResult<()> {
        match *self.config.get_max_upload_size() {
            Some(max) if size > max => Err(FilesError::TooLarge { size, max }),
            _ => Ok(()),
        }
    }

    async fn describe_local(&self, record: &Record, path: &Path, file_name: &str) -> FilesResult<()> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FilesError::NotFound(path.display().to_string())
            } else {
                e.into()
            }
        })?;
        if !metadata.is_file() {
            return Err(FilesError::Invalid(format!("{} is not a file", path.display())));
        }
        self.check_size(metadata.len())?;

        let extension = extension_of(file_name).unwrap_or_default();
        let mut content_type = mime_for_extension(&extension).to_string();
        if content_type == "application/octet-stream" {
            let sample = tokio::fs::read(path).await?;
            content_type = detect_content_type(file_name, &sample[..sample.len().min(512)]);
        }

        set_description(record, file_name, metadata.len(), &content_type);
        Ok(())
    }

    /// Write the staged bytes of a record about to be saved. A string in
    /// the `data` attribute is ingested as a local path.
    pub(crate) async fn persist(&self, record: &Record) -> FilesResult<()> {
        let source = match record.take_extension::<StagedSource>() {
            Some(source) => source,
            None => match record.get_str(DATA).filter(|path| !path.is_empty()) {
                Some(path) => {
                    let path = PathBuf::from(path);
                    let file_name = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(str::to_string)
                        .ok_or_else(|| FilesError::Invalid(format!("{} has no file name", path.display())))?;
                    self.describe_local(record, &path, &file_name).await?;
                    StagedSource::Local(path)
                }
                None if record.get_str(DISK_NAME).is_some() => return Ok(()),
                None => {
                    return Err(FilesError::MissingData {
                        file_name: record.get_str(FILE_NAME).unwrap_or_default(),
                    })
                }
            },
        };

        let file_name = record.get_str(FILE_NAME).unwrap_or_default();
        if record.get_str(DISK_NAME).is_none() {
            record.set(DISK_NAME, generate_disk_name(&file_name));
        }
        if record.get(IS_PUBLIC).is_null() {
            record.set(IS_PUBLIC, true);
        }
        let disk_name = record.get_str(DISK_NAME).unwrap_or_default();
        let is_public = record.get_bool(IS_PUBLIC).unwrap_or(true);
        let path = self.config.disk_path(is_public, &disk_name);
        let visibility = Visibility::from_public(is_public);

        match &source {
            StagedSource::Data(data) => self.disk.put(&path, data, visibility).await?,
            StagedSource::Local(local) => self.disk.put_file(&path, local, visibility).await?,
            StagedSource::Temp(temp) => self.disk.put_file(&path, temp.path(), visibility).await?,
            StagedSource::Storage(from) => {
                self.disk.copy(from, &path, visibility).await?;
                if !self.disk.exists(&path).await? {
                    return Err(FilesError::Consistency { path });
                }
            }
        }
        drop(source);

        if record.exists() {
            if let Some(id) = record.key_string() {
                self.delete_thumbs_of(&id, &directory_of(&path)).await;
            }
        }
        debug!("stored {} at {}", file_name, path);
        Ok(())
    }

    /// Best-effort removal of everything a deleted file left on the disk
    pub(crate) async fn cleanup(&self, record: &Record) {
        let Some(disk_name) = record.get_str(DISK_NAME) else {
            return;
        };
        let is_public = record.get_bool(IS_PUBLIC).unwrap_or(true);
        let path = self.config.disk_path(is_public, &disk_name);
        let directory = directory_of(&path);

        if let Some(id) = record.key_string() {
            self.delete_thumbs_of(&id, &directory).await;
        }
        match self.disk.delete(&path).await {
            Ok(_) => debug!("deleted {}", path),
            Err(e) => warn!("could not delete {}: {}", path, e),
        }
        self.existence.forget(&path).await;
        self.delete_empty_directories(&directory).await;
    }

    async fn delete_thumbs_of(&self, id: &str, directory: &str) -> usize {
        let prefix = thumb_prefix(id);
        let files = match self.disk.files(directory).await {
            Ok(files) => files,
            Err(e) => {
                warn!("could not list thumbnails in {}: {}", directory, e);
                return 0;
            }
        };
        let thumbs: Vec<&str> = files
            .iter()
            .map(String::as_str)
            .filter(|file| file.rsplit('/').next().map_or(false, |name| name.starts_with(&prefix)))
            .collect();
        if thumbs.is_empty() {
            return 0;
        }

        let deleted = match self.disk.delete_many(&thumbs).await {
            Ok(deleted) => deleted.len(),
            Err(e) => {
                warn!("could not delete thumbnails of file {}: {}", id, e);
                0
            }
        };
        for thumb in thumbs {
            self.existence.forget(thumb).await;
        }
        deleted
    }

    /// Remove up to three levels of partition directories left empty
    async fn delete_empty_directories(&self, directory: &str) {
        let mut current = directory.trim_end_matches('/').to_string();
        for _ in 0..3 {
            match self.disk.all_files(&current).await {
                Ok(files) if files.is_empty() => {}
                Ok(_) => return,
                Err(e) => {
                    debug!("could not list {}: {}", current, e);
                    return;
                }
            }
            if let Err(e) = self.disk.delete_empty_directory(&current).await {
                debug!("could not remove {}: {}", current, e);
                return;
            }
            match current.rfind('/') {
                Some(index) => current.truncate(index),
                None => return,
            }
        }
    }
}

impl std::fmt::Debug for FileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileService")
            .field("disk", &self.disk)
            .field("config", &self.config)
            .finish()
    }
}

fn set_description(record: &Record, file_name: &str, size: u64, content_type: &str) {
    record.set(FILE_NAME, file_name);
    record.set(FILE_SIZE, size);
    record.set(CONTENT_TYPE, content_type);
}

/// Directory part of a storage path, with trailing slash
fn directory_of(path: &str) -> String {
    match path.rfind('/') {
        Some(index) => path[..=index].to_string(),
        None => String::new(),
    }
}

/// A `File` record together with the service that stores it
#[derive(Clone)]
pub struct AttachedFile {
    record: Record,
    service: Arc<FileService>,
}

impl AttachedFile {
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    fn describe(&self, file_name: &str, size: u64, content_type: &str) {
        set_description(&self.record, file_name, size, content_type);
    }

    pub fn id(&self) -> Option<String> {
        self.record.key_string()
    }

    pub fn file_name(&self) -> String {
        self.record.get_str(FILE_NAME).unwrap_or_default()
    }

    pub fn file_size(&self) -> u64 {
        self.record.get_i64(FILE_SIZE).map_or(0, |size| size.max(0) as u64)
    }

    pub fn content_type(&self) -> String {
        self.record.get_str(CONTENT_TYPE).unwrap_or_default()
    }

    /// Generated on first use and never changed afterwards
    pub fn disk_name(&self) -> String {
        if let Some(disk_name) = self.record.get_str(DISK_NAME) {
            return disk_name;
        }
        let disk_name = generate_disk_name(&self.file_name());
        self.record.set(DISK_NAME, disk_name.as_str());
        disk_name
    }

    pub fn is_public(&self) -> bool {
        self.record.get_bool(IS_PUBLIC).unwrap_or(true)
    }

    pub fn set_public(&self, is_public: bool) {
        self.record.set(IS_PUBLIC, is_public);
    }

    pub fn extension(&self) -> String {
        extension_of(&self.file_name()).unwrap_or_default()
    }

    pub fn is_image(&self) -> bool {
        is_image_extension(&self.extension())
    }

    pub fn title(&self) -> Option<String> {
        self.record.get_str(TITLE)
    }

    pub fn set_title(&self, title: &str) {
        self.record.set(TITLE, title);
    }

    pub fn description(&self) -> Option<String> {
        self.record.get_str(DESCRIPTION)
    }

    pub fn set_description(&self, description: &str) {
        self.record.set(DESCRIPTION, description);
    }

    pub fn sort_order(&self) -> Option<i64> {
        self.record.get_i64(SORT_ORDER)
    }

    /// `"ABC/DE1/234/"` for disk name `"ABCDE1234.png"`
    pub fn get_partition_directory(&self) -> String {
        partition_directory(&self.disk_name())
    }

    /// Public or protected base directory, with trailing slash
    pub fn get_storage_directory(&self) -> String {
        format!("{}/", self.service.config.folder(self.is_public()))
    }

    /// Storage path of the file
    pub fn get_disk_path(&self) -> String {
        self.service.config.disk_path(self.is_public(), &self.disk_name())
    }

    /// URL of the file
    pub fn get_path(&self) -> String {
        self.service.config.url(self.is_public(), &self.disk_name())
    }

    /// Filesystem path of the file on local disks
    pub fn get_local_path(&self) -> Option<PathBuf> {
        self.service.disk.local_path(&self.get_disk_path())
    }

    pub async fn get_contents(&self) -> FilesResult<Option<Bytes>> {
        self.service.disk.get(&self.get_disk_path()).await
    }

    /// Whether the stored file is present on the disk
    pub async fn exists_on_disk(&self) -> FilesResult<bool> {
        self.service.has_file(&self.get_disk_path()).await
    }

    /// Human readable file size
    pub fn size_to_string(&self) -> String {
        size_to_string(self.file_size())
    }

    fn thumb_options(&self, options: Option<ThumbOptions>) -> ThumbOptions {
        options
            .unwrap_or_else(|| self.service.thumb_defaults())
            .resolved(&self.extension())
    }

    /// Storage path of a thumbnail
    pub fn get_thumb_path(&self, width: u32, height: u32, options: Option<ThumbOptions>) -> String {
        let options = self.thumb_options(options);
        let id = self.id().unwrap_or_default();
        format!(
            "{}{}{}",
            self.get_storage_directory(),
            self.get_partition_directory(),
            thumb_file_name(&id, width, height, &options)
        )
    }

    /// URL of a thumbnail, generated on first request.
    ///
    /// Files that are not images, or not saved yet, return their own URL.
    /// A source that cannot be resized yields a placeholder image; this
    /// never fails.
    pub async fn get_thumb(&self, width: u32, height: u32, options: Option<ThumbOptions>) -> String {
        let Some(id) = self.id() else {
            return self.get_path();
        };
        if !self.is_image() {
            return self.get_path();
        }

        let options = self.thumb_options(options);
        let file_name = thumb_file_name(&id, width, height, &options);
        let path = format!("{}{}{}", self.get_storage_directory(), self.get_partition_directory(), file_name);

        let exists = match self.service.has_file(&path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("existence check of {} failed: {}", path, e);
                false
            }
        };
        if !exists {
            if let Err(e) = self.make_thumb(&path, width, height, &options).await {
                warn!("could not write thumbnail {}: {}", path, e);
            }
        }

        format!(
            "{}/{}{}",
            self.service.config.url_prefix(self.is_public()),
            self.get_partition_directory(),
            file_name
        )
    }

    async fn make_thumb(&self, path: &str, width: u32, height: u32, options: &ThumbOptions) -> FilesResult<()> {
        let resized = match self.get_contents().await {
            Ok(Some(source)) => {
                let task_options = options.clone();
                tokio::task::spawn_blocking(move || thumbnail::resize(&source, width, height, &task_options))
                    .await
                    .map_err(FilesError::from)
                    .and_then(|result| result)
            }
            Ok(None) => Err(FilesError::NotFound(self.get_disk_path())),
            Err(e) => Err(e),
        };

        let data = match resized {
            Ok(data) => data,
            Err(e) => {
                warn!("thumbnail of {} failed, using placeholder: {}", self.get_disk_path(), e);
                thumbnail::placeholder_image(width, height, options)?
            }
        };

        self.service
            .disk
            .put(path, &data, Visibility::from_public(self.is_public()))
            .await?;
        debug!("generated thumbnail {}", path);
        Ok(())
    }

    /// Delete every generated thumbnail of this file
    pub async fn delete_thumbs(&self) -> usize {
        match self.id() {
            Some(id) => {
                let directory = format!("{}{}", self.get_storage_directory(), self.get_partition_directory());
                self.service.delete_thumbs_of(&id, &directory).await
            }
            None => 0,
        }
    }

    pub async fn save(&self) -> FilesResult<()> {
        self.service.storm.save(&self.record, None).await?;
        Ok(())
    }

    pub async fn delete(&self) -> FilesResult<bool> {
        Ok(self.service.storm.delete(&self.record).await?)
    }
}

impl std::fmt::Debug for AttachedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedFile")
            .field("id", &self.id())
            .field("file_name", &self.file_name())
            .field("disk_name", &self.record.get_str(DISK_NAME))
            .finish()
    }
}

pub fn size_to_string(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let size = bytes as f64;
    if size >= GB {
        format!("{:.2} GB", size / GB)
    } else if size >= MB {
        format!("{:.2} MB", size / MB)
    } else if size >= KB {
        format!("{:.2} KB", size / KB)
    } else if bytes == 1 {
        "1 byte".to_string()
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_to_string() {
        assert_eq!(size_to_string(0), "0 bytes");
        assert_eq!(size_to_string(1), "1 byte");
        assert_eq!(size_to_string(512), "512 bytes");
        assert_eq!(size_to_string(1536), "1.50 KB");
        assert_eq!(size_to_string(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(size_to_string(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_directory_of() {
        assert_eq!(directory_of("uploads/public/ABC/DE1/234/x.png"), "uploads/public/ABC/DE1/234/");
        assert_eq!(directory_of("x.png"), "");
    }
}
