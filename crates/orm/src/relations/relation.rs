//! Relation objects
//!
//! `Relation` binds a definition to one parent record. It answers
//! membership questions (optionally overlaid with a deferred session) and
//! applies mutations, either immediately, through the ledger, or as a
//! continuation queued on the parent's next save.

use super::definition::{RelationDefinition, RelationKind};
use super::value::RelationValue;
use crate::context::Storm;
use crate::error::{ModelError, ModelResult};
use crate::events::{EventOutcome, RelationEvent, RelationEventKind};
use crate::model::{LifecyclePhase, Loaded, ModelSchema, PendingAction, Record, DELETED_AT};
use crate::query::{Condition, OrderBy, Query};
use crate::value::{key_string, Row};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct Relation<'a> {
    pub(crate) storm: &'a Storm,
    pub(crate) parent: Record,
    pub(crate) definition: RelationDefinition,
    /// `None` only for a `MorphTo` whose type column is empty or unknown
    pub(crate) related: Option<Arc<ModelSchema>>,
}

impl Storm {
    /// Relation `name` of `parent`
    pub fn relation(&self, parent: &Record, name: &str) -> ModelResult<Relation<'_>> {
        let definition = parent.schema().get_relation(name).cloned().ok_or_else(|| {
            ModelError::Relationship(format!("model '{}' has no relation '{}'", parent.model_name(), name))
        })?;
        let related = match definition.kind {
            RelationKind::MorphTo => parent
                .get_str(&definition.morph_type_column())
                .and_then(|model| self.schemas().find(&model)),
            _ => Some(self.schema(&definition.related)?),
        };
        Ok(Relation {
            storm: self,
            parent: parent.clone(),
            definition,
            related,
        })
    }
}

impl<'a> Relation<'a> {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn kind(&self) -> RelationKind {
        self.definition.kind
    }

    pub fn definition(&self) -> &RelationDefinition {
        &self.definition
    }

    pub fn parent(&self) -> &Record {
        &self.parent
    }

    pub fn related(&self) -> Option<&Arc<ModelSchema>> {
        self.related.as_ref()
    }

    pub(crate) fn related_schema(&self) -> ModelResult<Arc<ModelSchema>> {
        self.related.clone().ok_or_else(|| {
            ModelError::Relationship(format!("relation '{}' has no resolvable related model", self.name()))
        })
    }

    fn base_query(&self, related: &ModelSchema, with_trashed: bool) -> Query {
        let mut query = Query::table(&related.table).filters(self.definition.conditions.clone());
        if related.soft_deletes && !with_trashed {
            query = query.where_null(DELETED_AT);
        }
        query.orders = if self.definition.order.is_empty() {
            vec![OrderBy::asc(&related.key_name)]
        } else {
            self.definition.order.clone()
        };
        query
    }

    /// Columns of the related row pointing at the parent and the values they
    /// hold for members; `None` while the parent has no key
    pub(crate) fn owner_columns(&self) -> Option<Vec<(String, Value)>> {
        let key = self.parent.key()?;
        let schema = self.parent.schema();
        let mut columns = vec![(self.definition.foreign_key(schema), key)];
        if matches!(
            self.kind(),
            RelationKind::MorphOne | RelationKind::MorphMany | RelationKind::AttachOne | RelationKind::AttachMany
        ) {
            columns.push((self.definition.morph_type_column(), Value::from(schema.name.as_str())));
        }
        if self.kind().is_attachment() {
            columns.push(("field".to_string(), Value::from(self.name())));
        }
        Some(columns)
    }

    /// Membership as currently persisted, as a condition on the related table
    async fn persisted_condition(&self, related: &ModelSchema) -> ModelResult<Condition> {
        match self.kind() {
            RelationKind::BelongsTo | RelationKind::MorphTo => {
                let value = self.parent.get(&self.parent_key_column());
                if key_string(&value).is_none() {
                    return Ok(Condition::never());
                }
                let column = match self.kind() {
                    RelationKind::BelongsTo => self.definition.other_key_for(related),
                    _ => related.key_name.clone(),
                };
                Ok(Condition::Eq(column, value))
            }
            kind if kind.uses_pivot() => {
                let ids = self.pivot_related_ids(related).await?;
                Ok(Condition::is_in(&related.key_name, ids))
            }
            _ => Ok(match self.owner_columns() {
                Some(columns) => Condition::All(columns.into_iter().map(|(c, v)| Condition::Eq(c, v)).collect()),
                None => Condition::never(),
            }),
        }
    }

    pub(crate) async fn membership_query(
        &self,
        related: &ModelSchema,
        session_key: Option<&str>,
        with_trashed: bool,
    ) -> ModelResult<Query> {
        let persisted = self.persisted_condition(related).await?;
        let query = self.base_query(related, with_trashed);
        let session_key = match session_key {
            Some(key) if self.kind().is_deferrable() => key,
            _ => return Ok(query.filter(persisted)),
        };

        let membership = self
            .storm
            .ledger()
            .membership(self.parent.model_name(), self.name(), &related.name, session_key)
            .await?;
        let keys = |keys: Vec<String>| keys.into_iter().map(Value::String).collect::<Vec<_>>();

        let mut query = query.filter(Condition::Any(vec![
            persisted,
            Condition::is_in(&related.key_name, keys(membership.bound)),
        ]));
        if !membership.unbound.is_empty() {
            query = query.where_not_in(&related.key_name, keys(membership.unbound));
        }
        Ok(query)
    }

    /// Query for the relation's members, including records bound and
    /// excluding records unbound in `session_key`
    pub async fn with_deferred(&self, session_key: Option<&str>) -> ModelResult<Query> {
        let related = self.related_schema()?;
        self.membership_query(&related, session_key, false).await
    }

    pub async fn get_results(&self, session_key: Option<&str>) -> ModelResult<Vec<Record>> {
        let Some(related) = self.related.clone() else {
            return Ok(Vec::new());
        };
        if self.definition.flags.count_only {
            return self.count_only_results(&related, session_key).await;
        }

        let query = self.membership_query(&related, session_key, false).await?;
        let records: Vec<Record> = self
            .storm
            .select(&query)
            .await?
            .into_iter()
            .map(|row| self.storm.hydrate(&related, row))
            .collect();
        if self.kind().uses_pivot() {
            self.attach_pivots(&related, &records).await?;
        }
        Ok(records)
    }

    /// Persisted members, optionally including soft-deleted ones
    pub(crate) async fn persisted_records(&self, with_trashed: bool) -> ModelResult<Vec<Record>> {
        let Some(related) = self.related.clone() else {
            return Ok(Vec::new());
        };
        let query = self.membership_query(&related, None, with_trashed).await?;
        Ok(self
            .storm
            .select(&query)
            .await?
            .into_iter()
            .map(|row| self.storm.hydrate(&related, row))
            .collect())
    }

    pub async fn first(&self, session_key: Option<&str>) -> ModelResult<Option<Record>> {
        Ok(self.get_results(session_key).await?.into_iter().next())
    }

    pub async fn count(&self, session_key: Option<&str>) -> ModelResult<u64> {
        let Some(related) = self.related.clone() else {
            return Ok(0);
        };
        if self.definition.flags.count_only {
            let counted = self.count_only_results(&related, session_key).await?;
            return Ok(counted.first().and_then(|r| r.get_i64("count")).unwrap_or(0).max(0) as u64);
        }
        let query = self.membership_query(&related, session_key, false).await?;
        Ok(self.storm.select(&query).await?.len() as u64)
    }

    /// Fetch the persisted members and keep them on the parent
    pub async fn load(&self) -> ModelResult<Loaded> {
        let results = self.get_results(None).await?;
        let loaded = if self.kind().is_collection() {
            Loaded::Many(results)
        } else {
            Loaded::One(results.into_iter().next())
        };
        self.parent.set_relation(self.name(), loaded.clone());
        Ok(loaded)
    }

    fn check_related(&self, record: &Record) -> ModelResult<()> {
        if self.kind() != RelationKind::MorphTo && record.model_name() != self.definition.related {
            return Err(ModelError::InvalidArgument(format!(
                "relation '{}' expects {} records, got {}",
                self.name(),
                self.definition.related,
                record.model_name()
            )));
        }
        Ok(())
    }

    /// Add `record` to the relation. With a session key the change is only
    /// written to the ledger.
    pub async fn add(&self, record: &Record, session_key: Option<&str>, pivot: Row) -> ModelResult<()> {
        self.check_related(record)?;

        if let Some(session_key) = session_key {
            if self.kind().is_attachment() {
                self.prepare_attachment(record);
                if !record.exists() {
                    self.storm.save(record, None).await?;
                }
            }
            self.storm
                .ledger()
                .bind(&self.parent, self.name(), record, session_key, pivot)
                .await?;
            return Ok(());
        }

        match self.kind() {
            RelationKind::BelongsTo | RelationKind::MorphTo => self.associate(record).await,
            kind if kind.uses_pivot() => self.add_pivot(record, pivot).await,
            _ => self.add_owned(record).await,
        }
    }

    /// Remove `record` from the relation. Records that are not members are
    /// ignored.
    pub async fn remove(&self, record: &Record, session_key: Option<&str>) -> ModelResult<()> {
        self.check_related(record)?;

        if let Some(session_key) = session_key {
            self.storm
                .ledger()
                .unbind(&self.parent, self.name(), record, session_key)
                .await?;
            return Ok(());
        }

        match self.kind() {
            RelationKind::BelongsTo | RelationKind::MorphTo => {
                if self.is_associated_with(record) {
                    self.dissociate().await
                } else {
                    Ok(())
                }
            }
            kind if kind.uses_pivot() => self.remove_pivot(record).await,
            _ => self.remove_owned(record).await,
        }
    }

    /// Replace the relation's members. Collection relations on a parent
    /// without a key queue the change for its next save.
    pub async fn set_simple_value(&self, value: impl Into<RelationValue>) -> ModelResult<()> {
        let value = value.into();
        if matches!(self.kind(), RelationKind::BelongsTo | RelationKind::MorphTo) {
            return self.set_associated_value(value).await;
        }

        if !self.parent.exists() {
            self.parent.queue(
                LifecyclePhase::AfterSave,
                PendingAction::SetSimpleValue {
                    relation: self.name().to_string(),
                    value,
                },
            );
            return Ok(());
        }

        let records = self.resolve_records(value).await?;
        if self.kind().uses_pivot() {
            self.sync_records(&records).await
        } else {
            self.replace_owned(&records).await
        }
    }

    async fn resolve_records(&self, value: RelationValue) -> ModelResult<Vec<Record>> {
        let related = self.related_schema()?;
        let mut records = Vec::new();
        for item in value.flatten() {
            match item {
                RelationValue::Record(record) => records.push(record),
                RelationValue::Key(key) => match self.storm.find(&related.name, key.clone()).await? {
                    Some(record) => records.push(record),
                    None => debug!("{} {} not found, skipped for '{}'", related.name, key, self.name()),
                },
                _ => {}
            }
        }
        Ok(records)
    }

    /// Primitive form of the relation: foreign key, `[id, type]` pair, or
    /// the presented members
    pub async fn get_simple_value(&self, session_key: Option<&str>) -> ModelResult<Value> {
        match self.kind() {
            RelationKind::BelongsTo => return Ok(self.parent.get(&self.parent_key_column())),
            RelationKind::MorphTo => {
                let id = self.parent.get(&self.parent_key_column());
                if key_string(&id).is_none() {
                    return Ok(Value::Null);
                }
                return Ok(Value::Array(vec![id, self.parent.get(&self.definition.morph_type_column())]));
            }
            _ => {}
        }

        let records = match (session_key, self.parent.loaded_relation(self.name())) {
            (None, Some(loaded)) => loaded.records(),
            _ => self.get_results(session_key).await?,
        };
        let mut values: Vec<Value> = records.iter().map(present).collect();
        if self.kind().is_collection() {
            Ok(Value::Array(values))
        } else if values.is_empty() {
            Ok(Value::Null)
        } else {
            Ok(values.swap_remove(0))
        }
    }

    /// Create a related record and add it
    pub async fn create(&self, attributes: Row, session_key: Option<&str>) -> ModelResult<Record> {
        let related = self.related_schema()?;
        let record = Record::new(related);
        record.fill(attributes);
        if self.kind().is_attachment() {
            self.prepare_attachment(&record);
        }
        if session_key.is_some() || !self.kind().related_holds_key() || !self.parent.exists() {
            self.storm.save(&record, None).await?;
        }
        self.add(&record, session_key, Row::new()).await?;
        Ok(record)
    }

    /// Write sort positions for the given member keys. Without explicit
    /// orders the keys are numbered from 1 in the given sequence. Keys of
    /// rows outside the relation are ignored.
    pub async fn set_relation_order(&self, ids: &[Value], orders: Option<&[i64]>) -> ModelResult<()> {
        let orders: Vec<i64> = match orders {
            Some(orders) if orders.len() != ids.len() => {
                return Err(ModelError::InvalidArgument(format!(
                    "{} ids but {} orders given for '{}'",
                    ids.len(),
                    orders.len(),
                    self.name()
                )))
            }
            Some(orders) => orders.to_vec(),
            None => (1..=ids.len() as i64).collect(),
        };

        let related = self.related_schema()?;
        let column = self.definition.sort_column();
        let members = self.persisted_condition(&related).await?;
        for (id, order) in ids.iter().zip(orders) {
            let mut values = Row::new();
            values.insert(column.clone(), Value::from(order));
            let query = if self.kind().uses_pivot() {
                self.pivot_query(&related)?
                    .where_eq(self.definition.other_key_for(&related), id.clone())
            } else {
                Query::table(&related.table)
                    .where_eq(&related.key_name, id.clone())
                    .filter(members.clone())
            };
            self.storm.update(&query, values).await?;
        }
        self.parent.unset_relation(self.name());
        Ok(())
    }

    /// Deliver a relation event; `false` when a listener vetoed it
    pub(crate) async fn fire(&self, kind: RelationEventKind, related: Option<&Record>, pivot: &Row) -> ModelResult<bool> {
        let event = RelationEvent::new(kind, &self.parent, self.name(), related).with_pivot(pivot.clone());
        Ok(self.storm.observers().fire(&event).await? == EventOutcome::Continue)
    }
}

fn present(record: &Record) -> Value {
    match &record.schema().presenter {
        Some(presenter) => presenter.simple_value(record),
        None => record.key().unwrap_or(Value::Null),
    }
}
