//! Record persistence on the context: save, push, delete, restore, find
//!
//! Saving, pushing and deleting recurse through relations (a save can
//! replay deferred bindings that save other records), so those paths return
//! boxed futures.

use crate::context::Storm;
use crate::deferred::CommitPhase;
use crate::error::{ModelError, ModelResult};
use crate::events::ModelEvent;
use crate::model::{LifecyclePhase, ModelSchema, PendingAction, Record, CREATED_AT, DELETED_AT, UPDATED_AT};
use crate::query::Query;
use crate::relations::capabilities;
use crate::value::{BoxFuture, Row};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

impl Storm {
    /// Insert or update a record.
    ///
    /// With a session key, deferred `BelongsTo` bindings are replayed before
    /// the row is written and every other deferred binding after it.
    pub fn save<'a>(&'a self, record: &'a Record, session_key: Option<&'a str>) -> BoxFuture<'a, ModelResult<()>> {
        Box::pin(async move {
            if let Some(session_key) = session_key {
                self.ledger().commit(record, session_key, CommitPhase::Before).await?;
            }

            let creating = !record.exists();
            self.run_pending(record, &LifecyclePhase::before(creating)).await?;

            self.observers().trigger(self, ModelEvent::Saving, record).await?;
            let event = if creating { ModelEvent::Creating } else { ModelEvent::Updating };
            self.observers().trigger(self, event, record).await?;

            let schema = record.schema().clone();
            if schema.timestamps {
                let now = Value::String(Utc::now().to_rfc3339());
                if creating {
                    if record.get(CREATED_AT).is_null() {
                        record.set(CREATED_AT, now.clone());
                    }
                    record.set(UPDATED_AT, now);
                } else if record.is_dirty() {
                    record.set(UPDATED_AT, now);
                }
            }
            for attribute in &schema.purgeable {
                record.unset(attribute);
            }

            if creating {
                let stored = self.insert(&schema.table, &schema.key_name, record.attributes()).await?;
                record.mark_persisted(stored);
                debug!("inserted {}#{}", schema.name, record.key_string().unwrap_or_default());
            } else {
                let dirty = record.dirty();
                if !dirty.is_empty() {
                    let key = record.key().ok_or(ModelError::MissingPrimaryKey)?;
                    let query = Query::table(&schema.table).where_eq(&schema.key_name, key);
                    self.update(&query, dirty).await?;
                    trace!("updated {}#{}", schema.name, record.key_string().unwrap_or_default());
                }
                record.sync_original();
            }

            let event = if creating { ModelEvent::Created } else { ModelEvent::Updated };
            self.observers().trigger(self, event, record).await?;
            self.observers().trigger(self, ModelEvent::Saved, record).await?;

            self.run_pending(record, &LifecyclePhase::after(creating)).await?;

            if let Some(session_key) = session_key {
                self.ledger().commit(record, session_key, CommitPhase::After).await?;
            }
            Ok(())
        })
    }

    async fn run_pending(&self, record: &Record, phases: &[LifecyclePhase]) -> ModelResult<()> {
        for action in record.take_pending(phases) {
            match action {
                PendingAction::SetSimpleValue { relation, value } => {
                    self.relation(record, &relation)?.set_simple_value(value).await?;
                }
                PendingAction::Add {
                    relation,
                    related,
                    pivot,
                } => {
                    self.relation(record, &relation)?.add(&related, None, pivot).await?;
                }
                PendingAction::AssociateWhenSaved { target, relation } => {
                    if let Some(target) = target.upgrade() {
                        self.relation(&target, &relation)?
                            .complete_association(record)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Save the record, then push every loaded record of its pushable
    /// relations
    pub fn push<'a>(&'a self, record: &'a Record, session_key: Option<&'a str>) -> BoxFuture<'a, ModelResult<()>> {
        Box::pin(async move {
            self.save(record, session_key).await?;
            for (name, loaded) in record.loaded_relations() {
                let pushable = record
                    .schema()
                    .get_relation(&name)
                    .map(|d| d.flags.pushable && !d.flags.count_only)
                    .unwrap_or(false);
                if !pushable {
                    continue;
                }
                for related in loaded.records() {
                    self.push(&related, None).await?;
                }
            }
            Ok(())
        })
    }

    /// Delete a record. Soft-deleting models are stamped instead of removed.
    /// Returns `false` when the record was never saved.
    pub fn delete<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, ModelResult<bool>> {
        self.delete_record(record, false)
    }

    /// Delete the row even for soft-deleting models
    pub fn force_delete<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, ModelResult<bool>> {
        self.delete_record(record, true)
    }

    fn delete_record<'a>(&'a self, record: &'a Record, force: bool) -> BoxFuture<'a, ModelResult<bool>> {
        Box::pin(async move {
            if !record.exists() {
                return Ok(false);
            }
            let key = record.key().ok_or(ModelError::MissingPrimaryKey)?;
            self.observers().trigger(self, ModelEvent::Deleting, record).await?;

            let schema = record.schema().clone();
            let query = Query::table(&schema.table).where_eq(&schema.key_name, key);

            if schema.soft_deletes && !force {
                let now = Value::String(Utc::now().to_rfc3339());
                record.set(DELETED_AT, now.clone());
                let mut values = Row::new();
                values.insert(DELETED_AT.to_string(), now);
                self.update(&query, values).await?;
                record.sync_original();
                capabilities::soft_delete_relations(self, record).await?;
                debug!("soft deleted {}#{}", schema.name, record.key_string().unwrap_or_default());
            } else {
                capabilities::delete_dependents(self, record).await?;
                self.delete_where(&query).await?;
                record.mark_deleted();
                debug!("deleted {}#{}", schema.name, record.key_string().unwrap_or_default());
            }

            self.observers().trigger(self, ModelEvent::Deleted, record).await?;
            Ok(true)
        })
    }

    /// Revive a soft-deleted record and the relations its deletion touched
    pub fn restore<'a>(&'a self, record: &'a Record) -> BoxFuture<'a, ModelResult<bool>> {
        Box::pin(async move {
            if !record.schema().soft_deletes || !record.is_trashed() {
                return Ok(false);
            }
            let key = record.key().ok_or(ModelError::MissingPrimaryKey)?;
            let schema = record.schema().clone();

            record.set(DELETED_AT, Value::Null);
            let mut values = Row::new();
            values.insert(DELETED_AT.to_string(), Value::Null);
            self.update(&Query::table(&schema.table).where_eq(&schema.key_name, key), values)
                .await?;
            record.sync_original();

            capabilities::restore_relations(self, record).await?;
            self.observers().trigger(self, ModelEvent::Restored, record).await?;
            Ok(true)
        })
    }

    async fn find_in(&self, schema: &Arc<ModelSchema>, key: Value, with_trashed: bool) -> ModelResult<Option<Record>> {
        let mut query = Query::table(&schema.table)
            .where_eq(&schema.key_name, key)
            .limit(1);
        if schema.soft_deletes && !with_trashed {
            query = query.where_null(DELETED_AT);
        }
        Ok(self
            .select(&query)
            .await?
            .into_iter()
            .next()
            .map(|row| self.hydrate(schema, row)))
    }

    pub async fn find(&self, model: &str, key: impl Into<Value>) -> ModelResult<Option<Record>> {
        let schema = self.schema(model)?;
        self.find_in(&schema, key.into(), false).await
    }

    pub async fn find_with_trashed(&self, model: &str, key: impl Into<Value>) -> ModelResult<Option<Record>> {
        let schema = self.schema(model)?;
        self.find_in(&schema, key.into(), true).await
    }

    /// Like `find`, failing with `NotFound`
    pub async fn find_or_fail(&self, model: &str, key: impl Into<Value>) -> ModelResult<Record> {
        let key = key.into();
        self.find(model, key.clone())
            .await?
            .ok_or_else(|| ModelError::NotFound(format!("{} {}", model, key)))
    }

    /// Every live record of a model, in key order
    pub async fn all(&self, model: &str) -> ModelResult<Vec<Record>> {
        let schema = self.schema(model)?;
        let mut query = Query::table(&schema.table).order_by(&schema.key_name);
        if schema.soft_deletes {
            query = query.where_null(DELETED_AT);
        }
        Ok(self
            .select(&query)
            .await?
            .into_iter()
            .map(|row| self.hydrate(&schema, row))
            .collect())
    }
}
