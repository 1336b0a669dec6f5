//! Pivot relations: `BelongsToMany`, `MorphToMany` and `MorphedByMany`
//!
//! Membership is read in two steps: the related keys are collected from the
//! pivot table first, then the related rows are selected by key.

use super::relation::Relation;
use crate::error::{ModelError, ModelResult};
use crate::events::RelationEventKind;
use crate::model::{LifecyclePhase, ModelSchema, PendingAction, Record, DELETED_AT};
use crate::query::Query;
use crate::value::{keys_equal, Row};
use serde_json::Value;

/// Pivot columns of a record loaded through a pivot relation
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot(pub Row);

impl Pivot {
    pub fn get(&self, column: &str) -> Value {
        self.0.get(column).cloned().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncChanges {
    pub attached: Vec<Value>,
    pub detached: Vec<Value>,
}

impl<'a> Relation<'a> {
    /// Every pivot row of the parent, trashed or not
    pub(crate) fn pivot_query(&self, related: &ModelSchema) -> ModelResult<Query> {
        let parent_key = self.parent.key().ok_or(ModelError::MissingPrimaryKey)?;
        let schema = self.parent.schema();
        let mut query = Query::table(self.definition.pivot_table(schema, related))
            .where_eq(self.definition.foreign_key(schema), parent_key);
        if let Some(morph_type) = self.definition.pivot_morph_type(schema, related) {
            query = query.where_eq(self.definition.morph_type_column(), morph_type);
        }
        Ok(query)
    }

    async fn pivot_rows(&self, related: &ModelSchema) -> ModelResult<Vec<Row>> {
        if self.parent.key().is_none() {
            return Ok(Vec::new());
        }
        let mut query = self.pivot_query(related)?;
        if self.definition.flags.soft_delete {
            query = query.where_null(DELETED_AT);
        }
        self.storm.select(&query).await
    }

    pub(crate) async fn pivot_related_ids(&self, related: &ModelSchema) -> ModelResult<Vec<Value>> {
        let other_key = self.definition.other_key_for(related);
        Ok(self
            .pivot_rows(related)
            .await?
            .into_iter()
            .filter_map(|mut row| row.remove(&other_key))
            .filter(|value| !value.is_null())
            .collect())
    }

    /// Give each loaded record its pivot row
    pub(crate) async fn attach_pivots(&self, related: &ModelSchema, records: &[Record]) -> ModelResult<()> {
        let foreign_key = self.definition.foreign_key(self.parent.schema());
        let other_key = self.definition.other_key_for(related);
        let rows = self.pivot_rows(related).await?;

        for record in records {
            let Some(key) = record.key() else { continue };
            let Some(row) = rows
                .iter()
                .find(|row| row.get(&other_key).map(|v| keys_equal(v, &key)).unwrap_or(false))
            else {
                continue;
            };

            let mut pivot = Row::new();
            for column in [&foreign_key, &other_key].into_iter().chain(self.definition.pivot.iter()) {
                pivot.insert(column.clone(), row.get(column).cloned().unwrap_or(Value::Null));
            }
            record.insert_extension(Pivot(pivot));
        }
        Ok(())
    }

    /// Link `keys` to the parent; keys already linked are skipped. Returns
    /// the keys actually attached.
    pub async fn attach(&self, keys: &[Value], pivot: Row) -> ModelResult<Vec<Value>> {
        let related = self.related_schema()?;
        let parent_key = self.parent.key().ok_or(ModelError::MissingPrimaryKey)?;
        let schema = self.parent.schema();
        let table = self.definition.pivot_table(schema, &related);
        let foreign_key = self.definition.foreign_key(schema);
        let other_key = self.definition.other_key_for(&related);
        let existing = self.pivot_related_ids(&related).await?;

        let mut attached: Vec<Value> = Vec::new();
        for key in keys {
            if existing.iter().chain(attached.iter()).any(|e| keys_equal(e, key)) {
                continue;
            }
            let mut row = pivot.clone();
            row.insert(foreign_key.clone(), parent_key.clone());
            row.insert(other_key.clone(), key.clone());
            if let Some(morph_type) = self.definition.pivot_morph_type(schema, &related) {
                row.insert(self.definition.morph_type_column(), Value::from(morph_type));
            }
            self.storm.insert(&table, "id", row).await?;
            attached.push(key.clone());
        }
        self.parent.unset_relation(self.name());
        Ok(attached)
    }

    /// Delete the pivot rows of `keys`, or all of the parent's pivot rows
    pub async fn detach(&self, keys: Option<&[Value]>) -> ModelResult<u64> {
        let related = self.related_schema()?;
        if self.parent.key().is_none() {
            return Ok(0);
        }
        let mut query = self.pivot_query(&related)?;
        if let Some(keys) = keys {
            if keys.is_empty() {
                return Ok(0);
            }
            query = query.where_in(self.definition.other_key_for(&related), keys.to_vec());
        }
        let detached = self.storm.delete_where(&query).await?;
        self.parent.unset_relation(self.name());
        Ok(detached)
    }

    /// Make `keys` the complete membership
    pub async fn sync(&self, keys: &[Value]) -> ModelResult<SyncChanges> {
        let related = self.related_schema()?;
        let current = self.pivot_related_ids(&related).await?;
        let detached: Vec<Value> = current
            .into_iter()
            .filter(|c| !keys.iter().any(|k| keys_equal(k, c)))
            .collect();
        if !detached.is_empty() {
            self.detach(Some(detached.as_slice())).await?;
        }
        let attached = self.attach(keys, Row::new()).await?;
        Ok(SyncChanges { attached, detached })
    }

    pub(crate) async fn add_pivot(&self, record: &Record, pivot: Row) -> ModelResult<()> {
        if !self.parent.exists() {
            self.parent.queue(
                LifecyclePhase::AfterSave,
                PendingAction::Add {
                    relation: self.name().to_string(),
                    related: record.clone(),
                    pivot,
                },
            );
            return Ok(());
        }
        if !record.exists() {
            self.storm.save(record, None).await?;
        }
        let key = record.key().ok_or(ModelError::MissingPrimaryKey)?;

        if !self.fire(RelationEventKind::BeforeAdd, Some(record), &pivot).await? {
            return Ok(());
        }
        self.attach(&[key], pivot.clone()).await?;
        self.fire(RelationEventKind::AfterAdd, Some(record), &pivot).await?;
        Ok(())
    }

    pub(crate) async fn remove_pivot(&self, record: &Record) -> ModelResult<()> {
        let Some(key) = record.key() else {
            return Ok(());
        };
        if !self.parent.exists() {
            return Ok(());
        }
        if !self.fire(RelationEventKind::BeforeRemove, Some(record), &Row::new()).await? {
            return Ok(());
        }
        self.detach(Some(std::slice::from_ref(&key))).await?;
        self.fire(RelationEventKind::AfterRemove, Some(record), &Row::new()).await?;
        Ok(())
    }

    pub(crate) async fn sync_records(&self, records: &[Record]) -> ModelResult<()> {
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            if !record.exists() {
                self.storm.save(record, None).await?;
            }
            if let Some(key) = record.key() {
                keys.push(key);
            }
        }
        self.sync(&keys).await?;
        Ok(())
    }

    /// Stamp (`deleted_at` set) or revive (`Null`) the parent's pivot rows
    pub(crate) async fn set_pivot_deleted_at(&self, deleted_at: Value) -> ModelResult<u64> {
        let related = self.related_schema()?;
        let query = self.pivot_query(&related)?;
        let query = if deleted_at.is_null() {
            query.where_not_null(DELETED_AT)
        } else {
            query.where_null(DELETED_AT)
        };
        let mut values = Row::new();
        values.insert(DELETED_AT.to_string(), deleted_at);
        let affected = self.storm.update(&query, values).await?;
        self.parent.unset_relation(self.name());
        Ok(affected)
    }
}
