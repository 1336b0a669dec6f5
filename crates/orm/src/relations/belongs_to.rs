//! Relations whose foreign key lives on the parent: `BelongsTo` and
//! `MorphTo`
//!
//! Associating only changes the parent in memory; the key reaches the store
//! when the parent is next saved. Associating a record that has no key yet
//! queues a continuation on that record, so its first save copies the new
//! key back into the parent.

use super::definition::RelationKind;
use super::relation::Relation;
use super::value::RelationValue;
use crate::error::{ModelError, ModelResult};
use crate::events::RelationEventKind;
use crate::model::{LifecyclePhase, Loaded, PendingAction, Record};
use crate::value::{key_string, keys_equal, Row};
use serde_json::Value;
use tracing::debug;

impl<'a> Relation<'a> {
    /// Parent column holding the related key
    pub(crate) fn parent_key_column(&self) -> String {
        match self.kind() {
            RelationKind::MorphTo => self.definition.morph_id_column(),
            _ => self.definition.foreign_key(self.parent.schema()),
        }
    }

    /// Value of `record` the parent's foreign key must hold, if it has one
    fn association_value(&self, record: &Record) -> Option<Value> {
        let column = match self.kind() {
            RelationKind::BelongsTo => self.definition.other_key_for(record.schema()),
            _ => record.key_name().to_string(),
        };
        let value = record.get(&column);
        key_string(&value).map(|_| value)
    }

    pub(crate) fn is_associated_with(&self, record: &Record) -> bool {
        let Some(value) = self.association_value(record) else {
            return false;
        };
        let type_matches = self.kind() != RelationKind::MorphTo
            || self.parent.get_str(&self.definition.morph_type_column()).as_deref() == Some(record.model_name());
        type_matches && keys_equal(&self.parent.get(&self.parent_key_column()), &value)
    }

    pub async fn associate(&self, record: &Record) -> ModelResult<()> {
        if !self.fire(RelationEventKind::BeforeAssociate, Some(record), &Row::new()).await? {
            return Ok(());
        }

        match self.association_value(record) {
            Some(value) => self.parent.set(&self.parent_key_column(), value),
            None => {
                debug!(
                    "{} has no key yet, '{}' completes when it is saved",
                    record.model_name(),
                    self.name()
                );
                record.queue(
                    LifecyclePhase::AfterSave,
                    PendingAction::AssociateWhenSaved {
                        target: self.parent.downgrade(),
                        relation: self.name().to_string(),
                    },
                );
            }
        }
        if self.kind() == RelationKind::MorphTo {
            self.parent
                .set(&self.definition.morph_type_column(), record.model_name());
        }
        self.parent.set_relation(self.name(), Loaded::One(Some(record.clone())));

        self.fire(RelationEventKind::AfterAssociate, Some(record), &Row::new()).await?;
        Ok(())
    }

    pub async fn dissociate(&self) -> ModelResult<()> {
        if !self.fire(RelationEventKind::BeforeDissociate, None, &Row::new()).await? {
            return Ok(());
        }

        self.parent.set(&self.parent_key_column(), Value::Null);
        if self.kind() == RelationKind::MorphTo {
            self.parent.set(&self.definition.morph_type_column(), Value::Null);
        }
        self.parent.set_relation(self.name(), Loaded::One(None));

        self.fire(RelationEventKind::AfterDissociate, None, &Row::new()).await?;
        Ok(())
    }

    /// Continuation run after `related` got its key. Saves the parent if it
    /// already exists; no-op when the key is already in place.
    pub(crate) async fn complete_association(&self, related: &Record) -> ModelResult<()> {
        let Some(value) = self.association_value(related) else {
            return Ok(());
        };
        let column = self.parent_key_column();
        if keys_equal(&self.parent.get(&column), &value) {
            return Ok(());
        }

        self.parent.set(&column, value);
        if self.kind() == RelationKind::MorphTo {
            self.parent
                .set(&self.definition.morph_type_column(), related.model_name());
        }
        if self.parent.exists() {
            self.storm.save(&self.parent, None).await?;
        }
        Ok(())
    }

    pub(crate) async fn set_associated_value(&self, value: RelationValue) -> ModelResult<()> {
        let items = value.flatten();
        if items.is_empty() {
            return self.dissociate().await;
        }

        if self.kind() == RelationKind::MorphTo {
            if let [RelationValue::Key(id), RelationValue::Key(Value::String(model))] = items.as_slice() {
                self.parent.set(&self.parent_key_column(), id.clone());
                self.parent
                    .set(&self.definition.morph_type_column(), model.as_str());
                self.parent.unset_relation(self.name());
                return Ok(());
            }
        }

        match items.into_iter().next() {
            Some(RelationValue::Record(record)) => self.associate(&record).await,
            Some(RelationValue::Key(key)) if self.kind() == RelationKind::BelongsTo => {
                self.parent.set(&self.parent_key_column(), key);
                self.parent.unset_relation(self.name());
                Ok(())
            }
            _ => Err(ModelError::InvalidArgument(format!(
                "relation '{}' needs a record or an [id, type] pair",
                self.name()
            ))),
        }
    }
}
