//! Lifecycle hooks of the `File` model

use crate::file::FileService;
use crate::schema::SORT_ORDER;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use storm_orm::{EventError, ModelObserver, Query, Record, Row, Storm};
use tracing::debug;

pub(crate) struct FileObserver {
    // The service owns a handle on the context that owns this observer
    service: Weak<FileService>,
}

impl FileObserver {
    pub(crate) fn new(service: &Arc<FileService>) -> Self {
        Self {
            service: Arc::downgrade(service),
        }
    }

    fn service(&self) -> Option<Arc<FileService>> {
        self.service.upgrade()
    }
}

#[async_trait]
impl ModelObserver for FileObserver {
    /// Write staged bytes before the row is stored
    async fn saving(&self, _storm: &Storm, record: &Record) -> Result<(), EventError> {
        if let Some(service) = self.service() {
            service.persist(record).await?;
        }
        Ok(())
    }

    /// New files sort after every existing one
    async fn created(&self, storm: &Storm, record: &Record) -> Result<(), EventError> {
        if !record.get(SORT_ORDER).is_null() {
            return Ok(());
        }
        let Some(key) = record.key() else {
            return Ok(());
        };

        record.set(SORT_ORDER, key.clone());
        let mut values = Row::new();
        values.insert(SORT_ORDER.to_string(), key.clone());
        storm
            .update(&Query::table(record.table()).where_eq(record.key_name(), key), values)
            .await?;
        record.sync_original();
        Ok(())
    }

    /// Errors are logged and dropped so the row deletion stands
    async fn deleted(&self, _storm: &Storm, record: &Record) -> Result<(), EventError> {
        match self.service() {
            Some(service) => service.cleanup(record).await,
            None => debug!(
                "file service dropped, skipping disk cleanup of file {}",
                record.key_string().unwrap_or_default()
            ),
        }
        Ok(())
    }
}
