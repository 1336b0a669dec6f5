//! Behaviors shared across relation kinds, selected by definition flags
//! rather than by kind: cascade delete, soft-delete propagation and
//! count-only results.

use super::relation::Relation;
use crate::context::Storm;
use crate::error::ModelResult;
use crate::model::{ModelSchema, Record};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Hard-delete the members of dependent relations and detach pivot rows
/// of relations flagged `detach`
pub(crate) async fn delete_dependents(storm: &Storm, record: &Record) -> ModelResult<()> {
    for definition in record.schema().relations.iter() {
        let detach = definition.kind.uses_pivot() && definition.flags.detach;
        if !definition.flags.dependent && !detach {
            continue;
        }
        let relation = storm.relation(record, &definition.name)?;

        if definition.flags.dependent {
            for related in relation.persisted_records(true).await? {
                debug!(
                    "cascading delete of {} to {} through '{}'",
                    record.model_name(),
                    related.model_name(),
                    definition.name
                );
                storm.force_delete(&related).await?;
            }
        }
        if detach {
            relation.detach(None).await?;
        }
    }
    Ok(())
}

/// Propagate a soft delete into relations flagged `soft_delete`: pivot rows
/// are stamped, members are deleted
pub(crate) async fn soft_delete_relations(storm: &Storm, record: &Record) -> ModelResult<()> {
    for definition in record.schema().relations.iter().filter(|d| d.flags.soft_delete) {
        let relation = storm.relation(record, &definition.name)?;
        if definition.kind.uses_pivot() {
            relation
                .set_pivot_deleted_at(Value::String(Utc::now().to_rfc3339()))
                .await?;
            continue;
        }
        for related in relation.persisted_records(false).await? {
            storm.delete(&related).await?;
        }
    }
    Ok(())
}

/// Undo `soft_delete_relations` on restore
pub(crate) async fn restore_relations(storm: &Storm, record: &Record) -> ModelResult<()> {
    for definition in record.schema().relations.iter().filter(|d| d.flags.soft_delete) {
        let relation = storm.relation(record, &definition.name)?;
        if definition.kind.uses_pivot() {
            relation.set_pivot_deleted_at(Value::Null).await?;
            continue;
        }
        for related in relation.persisted_records(true).await? {
            if related.is_trashed() {
                storm.restore(&related).await?;
            }
        }
    }
    Ok(())
}

impl<'a> Relation<'a> {
    /// A single record carrying the owner key and `count`
    pub(crate) async fn count_only_results(
        &self,
        related: &Arc<ModelSchema>,
        session_key: Option<&str>,
    ) -> ModelResult<Vec<Record>> {
        let mut query = self.membership_query(related, session_key, false).await?;
        query.orders.clear();

        let column = if self.kind().related_holds_key() {
            self.definition.foreign_key(self.parent.schema())
        } else {
            related.key_name.clone()
        };
        let total: i64 = self
            .storm
            .count_by(&query, &column)
            .await?
            .iter()
            .map(|(_, count)| *count)
            .sum();

        let record = Record::new(related.clone());
        if self.kind().related_holds_key() {
            record.set(&column, self.parent.key().unwrap_or(Value::Null));
        }
        record.set("count", total);
        Ok(vec![record])
    }
}
