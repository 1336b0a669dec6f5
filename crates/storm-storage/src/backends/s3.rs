//! AWS S3 storage backend

use crate::config::S3Config;
use crate::{FileMetadata, StorageBackend, StorageError, StorageResult, UploadOptions, Visibility};
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

/// AWS S3 storage backend
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    config: S3Config,
}

impl S3Backend {
    /// Create a new S3 storage backend and check that the bucket is reachable
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));

        if let (Some(key_id), Some(secret_key)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret_key.clone(),
                None,
                None,
                "storm-storage",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let aws_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.path_style)
            .build();

        let client = Client::from_conf(s3_config);

        if let Err(e) = client.head_bucket().bucket(&config.bucket).send().await {
            return Err(StorageError::Configuration(format!(
                "Cannot access S3 bucket '{}': {}",
                config.bucket, e
            )));
        }

        Ok(Self { client, config })
    }

    /// Get the full S3 key for a storage path
    fn key(&self, path: &str) -> String {
        match &self.config.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/')),
            None => path.trim_start_matches('/').to_string(),
        }
    }

    /// Strip the configured prefix from an object key
    fn path_of(&self, key: &str) -> String {
        match &self.config.prefix {
            Some(prefix) => key
                .strip_prefix(prefix.trim_end_matches('/'))
                .unwrap_or(key)
                .trim_start_matches('/')
                .to_string(),
            None => key.to_string(),
        }
    }

    fn directory_prefix(&self, directory: &str) -> String {
        let key = self.key(directory);
        if key.is_empty() || key.ends_with('/') {
            key
        } else {
            format!("{}/", key)
        }
    }

    async fn list_keys(&self, prefix: &str, delimiter: bool) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token);
            if delimiter {
                request = request.delimiter("/");
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::Backend(format!("S3 list failed: {}", e)))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(self.path_of(key));
                }
            }

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|t| t.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn put(
        &self,
        path: &str,
        data: &[u8],
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata> {
        let key = self.key(path);
        let content_type = options
            .as_ref()
            .and_then(|o| o.content_type.clone())
            .unwrap_or_else(|| crate::detect_content_type(path, data));

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .content_type(&content_type)
            .body(ByteStream::from(Bytes::copy_from_slice(data)));

        if let Some(opts) = &options {
            request = match opts.visibility {
                Some(Visibility::Public) => request.acl(ObjectCannedAcl::PublicRead),
                Some(Visibility::Private) => request.acl(ObjectCannedAcl::Private),
                None => request,
            };
            for (name, value) in &opts.metadata {
                request = request.metadata(name, value);
            }
        }

        let response = request.send().await.map_err(|e| {
            error!("S3 put_object failed for {}: {}", key, e);
            StorageError::Backend(format!("S3 upload failed: {}", e))
        })?;

        let mut metadata = FileMetadata::new(path, data.len() as u64, content_type);
        metadata.etag = response.e_tag().map(|t| t.to_string());
        Ok(metadata)
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Bytes>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(self.key(path))
            .send()
            .await;

        match result {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| StorageError::Network(format!("S3 read failed: {}", e)))?;
                Ok(Some(data.into_bytes()))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(StorageError::Backend(format!("S3 download failed: {}", service_error)))
                }
            }
        }
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.metadata(path).await?.is_some())
    }

    async fn metadata(&self, path: &str) -> StorageResult<Option<FileMetadata>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(self.key(path))
            .send()
            .await;

        match result {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let content_type = output
                    .content_type()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| crate::detect_content_type(path, &[]));

                let mut metadata = FileMetadata::new(path, size, content_type);
                metadata.etag = output.e_tag().map(|t| t.to_string());
                if let Some(modified) = output.last_modified() {
                    metadata.modified_at =
                        DateTime::<Utc>::from_timestamp(modified.secs(), modified.subsec_nanos())
                            .unwrap_or_default();
                }
                Ok(Some(metadata))
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::Backend(format!("S3 head failed: {}", service_error)))
                }
            }
        }
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        if !self.exists(path).await? {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 delete failed: {}", e)))?;

        Ok(true)
    }

    async fn copy(
        &self,
        from: &str,
        to: &str,
        options: Option<UploadOptions>,
    ) -> StorageResult<FileMetadata> {
        let mut request = self
            .client
            .copy_object()
            .bucket(&self.config.bucket)
            .copy_source(format!("{}/{}", self.config.bucket, self.key(from)))
            .key(self.key(to));

        if let Some(Visibility::Public) = options.as_ref().and_then(|o| o.visibility) {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request.send().await.map_err(|e| {
            error!("S3 copy_object failed: {} -> {}: {}", from, to, e);
            StorageError::Backend(format!("S3 copy failed: {}", e))
        })?;

        self.metadata(to)
            .await?
            .ok_or_else(|| StorageError::FileNotFound(to.to_string()))
    }

    async fn files(&self, directory: &str) -> StorageResult<Vec<String>> {
        let prefix = self.directory_prefix(directory);
        self.list_keys(&prefix, true).await
    }

    async fn all_files(&self, directory: &str) -> StorageResult<Vec<String>> {
        let prefix = self.directory_prefix(directory);
        self.list_keys(&prefix, false).await
    }

    async fn delete_directory(&self, directory: &str) -> StorageResult<bool> {
        let paths = self.all_files(directory).await?;
        if paths.is_empty() {
            return Ok(false);
        }

        for path in &paths {
            self.delete(path).await?;
        }

        debug!("Deleted {} objects under {}", paths.len(), directory);
        Ok(true)
    }

    async fn public_url(&self, path: &str) -> StorageResult<String> {
        let key = self.key(path);
        let url = if let Some(cdn_domain) = &self.config.cdn_domain {
            format!("https://{}/{}", cdn_domain, key)
        } else if let Some(endpoint) = &self.config.endpoint {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.config.bucket, key)
        } else if self.config.path_style {
            format!("https://s3.{}.amazonaws.com/{}/{}", self.config.region, self.config.bucket, key)
        } else {
            format!("https://{}.s3.{}.amazonaws.com/{}", self.config.bucket, self.config.region, key)
        };
        Ok(url)
    }
}
