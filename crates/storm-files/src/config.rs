//! Attachment configuration

use crate::partition::partition_directory;
use serde::{Deserialize, Serialize};
use service_builder::builder;

/// Where attached files live on the disk and how they are addressed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[builder]
pub struct FilesConfig {
    /// Table of the `File` model
    #[builder(getter, default = "\"system_files\".to_string()")]
    pub table: String,

    /// Storage directory of public files, relative to the disk root
    #[builder(getter, default = "\"uploads/public\".to_string()")]
    pub public_folder: String,

    /// Storage directory of protected files, relative to the disk root
    #[builder(getter, default = "\"uploads/protected\".to_string()")]
    pub protected_folder: String,

    /// URL prefix of public files
    #[builder(getter, default = "\"/storage/app/uploads/public\".to_string()")]
    pub public_url: String,

    /// URL prefix of protected files
    #[builder(getter, default = "\"/storage/app/uploads/protected\".to_string()")]
    pub protected_url: String,

    /// Default JPEG quality of generated thumbnails
    #[builder(getter, default = "90")]
    pub thumb_quality: u8,

    /// Default sharpening amount (0-100) of generated thumbnails
    #[builder(getter, default = "0")]
    pub thumb_sharpen: u8,

    /// Default interlace flag of generated thumbnails
    #[builder(getter, default = "false")]
    pub thumb_interlace: bool,

    /// Largest accepted upload in bytes
    #[builder(getter, default = "None")]
    pub max_upload_size: Option<u64>,

    /// Timeout of remote downloads, in seconds
    #[builder(getter, default = "30")]
    pub http_timeout_secs: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            table: "system_files".to_string(),
            public_folder: "uploads/public".to_string(),
            protected_folder: "uploads/protected".to_string(),
            public_url: "/storage/app/uploads/public".to_string(),
            protected_url: "/storage/app/uploads/protected".to_string(),
            thumb_quality: 90,
            thumb_sharpen: 0,
            thumb_interlace: false,
            max_upload_size: None,
            http_timeout_secs: 30,
        }
    }
}

impl FilesConfig {
    /// Defaults overridden by `STORM_FILES_TABLE`, `STORM_FILES_PUBLIC_FOLDER`,
    /// `STORM_FILES_PROTECTED_FOLDER`, `STORM_FILES_PUBLIC_URL`,
    /// `STORM_FILES_PROTECTED_URL`, `STORM_FILES_THUMB_QUALITY`,
    /// `STORM_FILES_MAX_UPLOAD_SIZE` and `STORM_FILES_HTTP_TIMEOUT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(table) = std::env::var("STORM_FILES_TABLE") {
            config.table = table;
        }
        if let Ok(folder) = std::env::var("STORM_FILES_PUBLIC_FOLDER") {
            config.public_folder = folder;
        }
        if let Ok(folder) = std::env::var("STORM_FILES_PROTECTED_FOLDER") {
            config.protected_folder = folder;
        }
        if let Ok(url) = std::env::var("STORM_FILES_PUBLIC_URL") {
            config.public_url = url;
        }
        if let Ok(url) = std::env::var("STORM_FILES_PROTECTED_URL") {
            config.protected_url = url;
        }
        if let Some(quality) = env_number::<u8>("STORM_FILES_THUMB_QUALITY") {
            config.thumb_quality = quality.clamp(1, 100);
        }
        if let Some(size) = env_number::<u64>("STORM_FILES_MAX_UPLOAD_SIZE") {
            config.max_upload_size = if size == 0 { None } else { Some(size) };
        }
        if let Some(secs) = env_number::<u64>("STORM_FILES_HTTP_TIMEOUT") {
            config.http_timeout_secs = secs;
        }

        config
    }

    /// Storage directory for the given visibility, without trailing slash
    pub fn folder(&self, is_public: bool) -> &str {
        let folder = if is_public {
            &self.public_folder
        } else {
            &self.protected_folder
        };
        folder.trim_end_matches('/')
    }

    /// URL prefix for the given visibility, without trailing slash
    pub fn url_prefix(&self, is_public: bool) -> &str {
        let url = if is_public {
            &self.public_url
        } else {
            &self.protected_url
        };
        url.trim_end_matches('/')
    }

    /// Storage path of a stored file: folder, partition, disk name
    pub fn disk_path(&self, is_public: bool, disk_name: &str) -> String {
        format!("{}/{}{}", self.folder(is_public), partition_directory(disk_name), disk_name)
    }

    /// URL of a stored file
    pub fn url(&self, is_public: bool, disk_name: &str) -> String {
        format!("{}/{}{}", self.url_prefix(is_public), partition_directory(disk_name), disk_name)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FilesConfig::default();
        assert_eq!(config.table, "system_files");
        assert_eq!(config.thumb_quality, 90);
        assert_eq!(config.folder(true), "uploads/public");
        assert_eq!(config.folder(false), "uploads/protected");
    }

    #[test]
    fn test_prefixes_drop_trailing_slash() {
        let config = FilesConfig::builder()
            .public_url("https://cdn.example.com/".to_string())
            .protected_folder("private/".to_string())
            .build_with_defaults()
            .unwrap();
        assert_eq!(config.url_prefix(true), "https://cdn.example.com");
        assert_eq!(config.folder(false), "private");
        assert_eq!(config.get_public_folder(), "uploads/public");
    }

    #[test]
    fn test_paths_use_partition() {
        let config = FilesConfig::default();
        assert_eq!(config.disk_path(true, "ABCDE1234.png"), "uploads/public/ABC/DE1/234/ABCDE1234.png");
        assert_eq!(
            config.url(false, "ABCDE1234.png"),
            "/storage/app/uploads/protected/ABC/DE1/234/ABCDE1234.png"
        );
    }
}
