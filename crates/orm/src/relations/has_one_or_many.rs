//! Relations whose related rows hold the parent's key: has-one/many,
//! morph-one/many and attachments

use super::relation::Relation;
use crate::error::{ModelError, ModelResult};
use crate::events::RelationEventKind;
use crate::model::{LifecyclePhase, PendingAction, Record};
use crate::value::{keys_equal, Row};
use serde_json::Value;

impl<'a> Relation<'a> {
    /// `record` currently points at the parent
    pub(crate) fn owns(&self, record: &Record) -> bool {
        match self.owner_columns() {
            Some(columns) => columns
                .iter()
                .all(|(column, value)| keys_equal(&record.get(column), value)),
            None => false,
        }
    }

    pub(crate) async fn add_owned(&self, record: &Record) -> ModelResult<()> {
        if !self.parent.exists() {
            self.parent.queue(
                LifecyclePhase::AfterSave,
                PendingAction::Add {
                    relation: self.name().to_string(),
                    related: record.clone(),
                    pivot: Row::new(),
                },
            );
            return Ok(());
        }
        let columns = self.owner_columns().ok_or(ModelError::MissingPrimaryKey)?;

        if !self.fire(RelationEventKind::BeforeAdd, Some(record), &Row::new()).await? {
            return Ok(());
        }
        if self.kind().is_attachment() {
            self.prepare_attachment(record);
        }
        if !self.kind().is_collection() {
            self.release_siblings(record).await?;
        }

        for (column, value) in columns {
            record.set(&column, value);
        }
        if !record.exists() || record.is_dirty() {
            self.storm.save(record, None).await?;
        }
        self.parent.unset_relation(self.name());

        self.fire(RelationEventKind::AfterAdd, Some(record), &Row::new()).await?;
        Ok(())
    }

    /// Make room on a to-one relation: attachments and dependent records are
    /// deleted, everything else is orphaned
    async fn release_siblings(&self, keep: &Record) -> ModelResult<()> {
        for sibling in self.persisted_records(false).await? {
            if sibling.is(keep) {
                continue;
            }
            if self.kind().is_attachment() || self.definition.flags.dependent {
                self.storm.delete(&sibling).await?;
            } else {
                self.orphan(&sibling).await?;
            }
        }
        Ok(())
    }

    async fn orphan(&self, record: &Record) -> ModelResult<()> {
        if let Some(columns) = self.owner_columns() {
            for (column, _) in columns {
                record.set(&column, Value::Null);
            }
        }
        self.storm.save(record, None).await
    }

    pub(crate) async fn remove_owned(&self, record: &Record) -> ModelResult<()> {
        if !self.owns(record) {
            return Ok(());
        }
        if !self.fire(RelationEventKind::BeforeRemove, Some(record), &Row::new()).await? {
            return Ok(());
        }

        if self.definition.flags.dependent {
            self.storm.delete(record).await?;
        } else {
            self.orphan(record).await?;
        }
        self.parent.unset_relation(self.name());

        self.fire(RelationEventKind::AfterRemove, Some(record), &Row::new()).await?;
        Ok(())
    }

    /// Make `records` the complete membership
    pub(crate) async fn replace_owned(&self, records: &[Record]) -> ModelResult<()> {
        let current = self.persisted_records(false).await?;
        for existing in &current {
            if !records.iter().any(|r| r.is(existing)) {
                self.remove_owned(existing).await?;
            }
        }

        let wanted: Vec<&Record> = if self.kind().is_collection() {
            records.iter().collect()
        } else {
            records.iter().take(1).collect()
        };
        for record in wanted {
            if !current.iter().any(|c| c.is(record)) {
                self.add_owned(record).await?;
            }
        }
        Ok(())
    }
}
