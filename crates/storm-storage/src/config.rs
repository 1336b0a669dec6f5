//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for file storage
    pub root_path: PathBuf,

    /// Base URL under which the root directory is served
    pub url: String,

    /// Create directories if they don't exist
    pub create_directories: bool,

    /// Permissions for public files (Unix only)
    #[cfg(unix)]
    pub file_permissions: Option<u32>,

    /// Permissions for private files (Unix only)
    #[cfg(unix)]
    pub private_file_permissions: Option<u32>,

    /// Directory permissions (Unix only)
    #[cfg(unix)]
    pub directory_permissions: Option<u32>,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("./storage/app"),
            url: "/storage/app".to_string(),
            create_directories: true,
            #[cfg(unix)]
            file_permissions: Some(0o644),
            #[cfg(unix)]
            private_file_permissions: Some(0o600),
            #[cfg(unix)]
            directory_permissions: Some(0o755),
        }
    }
}

impl LocalStorageConfig {
    /// Create new local storage configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `STORM_STORAGE_ROOT` and `STORM_STORAGE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("STORM_STORAGE_ROOT") {
            config.root_path = PathBuf::from(root);
        }
        if let Ok(url) = std::env::var("STORM_STORAGE_URL") {
            config.url = url;
        }
        config
    }

    /// Set root path
    pub fn with_root_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root_path = path.into();
        self
    }

    /// Set the public base URL
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = url.into();
        self
    }

    /// Disable automatic directory creation
    pub fn no_create_directories(mut self) -> Self {
        self.create_directories = false;
        self
    }

    /// Set file permissions (Unix only)
    #[cfg(unix)]
    pub fn with_file_permissions(mut self, public: u32, private: u32) -> Self {
        self.file_permissions = Some(public);
        self.private_file_permissions = Some(private);
        self
    }

    /// Set directory permissions (Unix only)
    #[cfg(unix)]
    pub fn with_directory_permissions(mut self, permissions: u32) -> Self {
        self.directory_permissions = Some(permissions);
        self
    }
}

/// AWS S3 configuration
#[cfg(feature = "aws-s3")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region
    pub region: String,

    /// Custom endpoint (for S3-compatible services)
    pub endpoint: Option<String>,

    /// Access key ID (if not using IAM roles)
    pub access_key_id: Option<String>,

    /// Secret access key (if not using IAM roles)
    pub secret_access_key: Option<String>,

    /// Path prefix for all files
    pub prefix: Option<String>,

    /// Use path-style URLs
    pub path_style: bool,

    /// CDN domain for public URLs
    pub cdn_domain: Option<String>,
}

#[cfg(feature = "aws-s3")]
impl S3Config {
    /// Create new S3 configuration
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: None,
            path_style: false,
            cdn_domain: None,
        }
    }

    /// Set AWS region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set custom endpoint (for S3-compatible services)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set AWS credentials
    pub fn with_credentials(mut self, access_key_id: String, secret_access_key: String) -> Self {
        self.access_key_id = Some(access_key_id);
        self.secret_access_key = Some(secret_access_key);
        self
    }

    /// Set path prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Use path-style URLs
    pub fn path_style(mut self) -> Self {
        self.path_style = true;
        self
    }

    /// Set CDN domain
    pub fn with_cdn(mut self, domain: impl Into<String>) -> Self {
        self.cdn_domain = Some(domain.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_defaults() {
        let config = LocalStorageConfig::default();
        assert_eq!(config.root_path, PathBuf::from("./storage/app"));
        assert!(config.create_directories);

        #[cfg(unix)]
        {
            assert_eq!(config.file_permissions, Some(0o644));
            assert_eq!(config.private_file_permissions, Some(0o600));
            assert_eq!(config.directory_permissions, Some(0o755));
        }
    }

    #[test]
    fn test_local_config_builder() {
        let config = LocalStorageConfig::new()
            .with_root_path("/tmp/storage")
            .with_url("https://cdn.example.com/storage")
            .no_create_directories();

        assert_eq!(config.root_path, PathBuf::from("/tmp/storage"));
        assert_eq!(config.url, "https://cdn.example.com/storage");
        assert!(!config.create_directories);
    }

    #[cfg(feature = "aws-s3")]
    #[test]
    fn test_s3_config() {
        let config = S3Config::new("my-bucket")
            .with_region("us-west-2")
            .with_prefix("uploads/")
            .with_cdn("cdn.example.com");

        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.prefix, Some("uploads/".to_string()));
        assert_eq!(config.cdn_domain, Some("cdn.example.com".to_string()));
    }
}
