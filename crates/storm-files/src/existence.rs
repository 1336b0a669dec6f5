//! Cached existence checks
//!
//! A positive answer is remembered without expiry. A negative answer is
//! evicted as soon as it is observed, so a file that appears later is found
//! on the next check.

use crate::disk::Disk;
use crate::error::FilesResult;
use std::sync::Arc;
use storm_cache::{Cache, CacheBackend};
use tracing::warn;

const KEY_PREFIX: &str = "file_exists::";

pub struct ExistenceCache {
    cache: Cache<Arc<dyn CacheBackend>>,
}

impl ExistenceCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            cache: Cache::new(backend),
        }
    }

    pub fn key(path: &str) -> String {
        format!("{}{}", KEY_PREFIX, path)
    }

    /// Whether `path` exists on the disk. Cache failures fall back to the
    /// storage answer.
    pub async fn has_file(&self, disk: &Disk, path: &str) -> FilesResult<bool> {
        let key = Self::key(path);
        match self.cache.get::<bool>(&key).await {
            Ok(Some(true)) => return Ok(true),
            Ok(_) => {}
            Err(e) => warn!("existence cache read for {} failed: {}", path, e),
        }

        let exists = disk.exists(path).await?;
        let written = if exists {
            self.cache.put_forever(&key, &true).await
        } else {
            self.cache.forget(&key).await.map(|_| ())
        };
        if let Err(e) = written {
            warn!("existence cache write for {} failed: {}", path, e);
        }
        Ok(exists)
    }

    /// Drop the cached answer for `path`
    pub async fn forget(&self, path: &str) {
        if let Err(e) = self.cache.forget(&Self::key(path)).await {
            warn!("existence cache eviction for {} failed: {}", path, e);
        }
    }

    pub fn cache(&self) -> &Cache<Arc<dyn CacheBackend>> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_cache::{CacheConfig, MemoryBackend};
    use storm_storage::{LocalBackend, LocalStorageConfig, Visibility};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_positive_answers_are_cached() {
        let dir = TempDir::new().unwrap();
        let disk = Disk::new(Arc::new(LocalBackend::new(
            LocalStorageConfig::default().with_root_path(dir.path()),
        )));
        let existence = ExistenceCache::new(Arc::new(MemoryBackend::new(CacheConfig::default())));

        assert!(!existence.has_file(&disk, "a.txt").await.unwrap());
        assert!(!existence.cache().exists(&ExistenceCache::key("a.txt")).await.unwrap());

        disk.put("a.txt", b"a", Visibility::Public).await.unwrap();
        assert!(existence.has_file(&disk, "a.txt").await.unwrap());
        assert!(existence.cache().exists("file_exists::a.txt").await.unwrap());

        existence.forget("a.txt").await;
        assert!(!existence.cache().exists("file_exists::a.txt").await.unwrap());
    }
}
