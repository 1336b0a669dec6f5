use super::binding::{resolve_bindings, DeferredBinding};
use crate::context::Storm;
use crate::error::{ModelError, ModelResult};
use crate::model::Record;
use crate::query::Query;
use crate::value::Row;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Which bindings a commit replays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// Before the parent row is written: `BelongsTo` only
    Before,
    /// After the parent row is written: every other deferrable kind
    After,
}

/// Keys a session has pending against one relation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    pub bound: Vec<String>,
    pub unbound: Vec<String>,
}

/// The deferred binding ledger, reached through `Storm::ledger`
pub struct DeferredLedger<'a> {
    storm: &'a Storm,
}

impl<'a> DeferredLedger<'a> {
    pub(crate) fn new(storm: &'a Storm) -> Self {
        Self { storm }
    }

    fn table(&self) -> &str {
        self.storm.config().get_deferred_table()
    }

    fn session_query(&self, master_type: &str, session_key: &str) -> Query {
        Query::table(self.table())
            .where_eq("master_type", master_type)
            .where_eq("session_key", session_key)
    }

    /// Record a pending add of `slave` to `relation`
    pub async fn bind(
        &self,
        parent: &Record,
        relation: &str,
        slave: &Record,
        session_key: &str,
        pivot: Row,
    ) -> ModelResult<DeferredBinding> {
        self.write(parent, relation, slave, session_key, pivot, true).await
    }

    /// Record a pending removal of `slave` from `relation`
    pub async fn unbind(
        &self,
        parent: &Record,
        relation: &str,
        slave: &Record,
        session_key: &str,
    ) -> ModelResult<DeferredBinding> {
        self.write(parent, relation, slave, session_key, Row::new(), false).await
    }

    async fn write(
        &self,
        parent: &Record,
        relation: &str,
        slave: &Record,
        session_key: &str,
        pivot: Row,
        is_bind: bool,
    ) -> ModelResult<DeferredBinding> {
        if session_key.is_empty() {
            return Err(ModelError::InvalidArgument("session key cannot be empty".to_string()));
        }
        let definition = parent.schema().get_relation(relation).ok_or_else(|| {
            ModelError::InvalidArgument(format!("model '{}' has no relation '{}'", parent.model_name(), relation))
        })?;
        if !definition.kind.is_deferrable() {
            return Err(ModelError::InvalidArgument(format!(
                "relation '{}' of type {} cannot be deferred",
                relation,
                definition.kind.as_str()
            )));
        }
        let slave_id = slave.key_string().ok_or_else(|| {
            ModelError::InvalidArgument(format!(
                "cannot defer an unsaved {} on relation '{}'",
                slave.model_name(),
                relation
            ))
        })?;

        let binding = DeferredBinding::new(parent.model_name(), relation, slave.model_name(), &slave_id, session_key, is_bind)
            .with_pivot(pivot);
        let stored = self.storm.insert(self.table(), "id", binding.to_row()?).await?;
        debug!(
            "deferred {} of {}#{} on {}.{} (session {})",
            if is_bind { "bind" } else { "unbind" },
            slave.model_name(),
            slave_id,
            parent.model_name(),
            relation,
            session_key
        );
        DeferredBinding::from_row(&stored)
    }

    /// All rows of a session for one parent model, in id order
    pub async fn bindings(&self, master_type: &str, session_key: &str) -> ModelResult<Vec<DeferredBinding>> {
        let query = self.session_query(master_type, session_key).order_by("id");
        self.storm
            .select(&query)
            .await?
            .iter()
            .map(DeferredBinding::from_row)
            .collect()
    }

    pub async fn has_bindings(&self, master_type: &str, session_key: &str) -> ModelResult<bool> {
        Ok(!self.bindings(master_type, session_key).await?.is_empty())
    }

    /// Net pending keys of `slave_type` on one relation, as used to overlay
    /// a session onto persisted membership
    pub async fn membership(
        &self,
        master_type: &str,
        relation: &str,
        slave_type: &str,
        session_key: &str,
    ) -> ModelResult<Membership> {
        let rows: Vec<DeferredBinding> = self
            .bindings(master_type, session_key)
            .await?
            .into_iter()
            .filter(|b| b.master_field == relation && b.slave_type == slave_type)
            .collect();

        let mut membership = Membership::default();
        for group in resolve_bindings(&rows) {
            if let Some(net) = group.net {
                if net.is_bind {
                    membership.bound.push(net.slave_id);
                } else {
                    membership.unbound.push(net.slave_id);
                }
            }
        }
        Ok(membership)
    }

    /// Replay a session's bindings onto a parent that now has a key.
    ///
    /// Bindings naming an unknown or non-deferrable relation, an unknown
    /// slave model or a slave that no longer exists are left in the ledger.
    /// Returns the number of operations applied.
    pub async fn commit(&self, parent: &Record, session_key: &str, phase: CommitPhase) -> ModelResult<usize> {
        let rows = self.bindings(parent.model_name(), session_key).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let schema = parent.schema().clone();
        let eligible: Vec<DeferredBinding> = rows
            .into_iter()
            .filter(|binding| match schema.get_relation(&binding.master_field) {
                Some(definition) if definition.kind.is_deferrable() => {
                    definition.kind.commits_before_save() == (phase == CommitPhase::Before)
                }
                _ => {
                    debug!(
                        "binding {:?} names no deferrable relation on {}, leaving it",
                        binding.id, schema.name
                    );
                    false
                }
            })
            .collect();
        if eligible.is_empty() {
            return Ok(0);
        }

        let mut applied = 0;
        for group in resolve_bindings(&eligible) {
            let Some(binding) = group.net.clone() else {
                self.delete_rows(&group.row_ids()).await?;
                continue;
            };

            if self.storm.schemas().find(&binding.slave_type).is_none() {
                debug!("binding {:?} names unknown model {}, leaving it", binding.id, binding.slave_type);
                continue;
            }
            let Some(slave) = self
                .storm
                .find_with_trashed(&binding.slave_type, Value::from(binding.slave_id.as_str()))
                .await?
            else {
                debug!("{}#{} no longer exists, leaving its binding", binding.slave_type, binding.slave_id);
                continue;
            };

            let relation = self.storm.relation(parent, &binding.master_field)?;
            if binding.is_bind {
                relation.add(&slave, None, binding.pivot_data.clone()).await?;
            } else {
                relation.remove(&slave, None).await?;
            }
            self.delete_rows(&group.row_ids()).await?;
            applied += 1;
        }

        self.storm.identity().invalidate();
        debug!(
            "committed {} deferred binding(s) on {} (session {})",
            applied,
            parent.model_name(),
            session_key
        );
        Ok(applied)
    }

    /// Discard a session's bindings without applying them. Bound slaves of
    /// dependent relations that never got an owner are deleted.
    pub async fn cancel(&self, master_type: &str, session_key: &str) -> ModelResult<u64> {
        let rows = self.bindings(master_type, session_key).await?;
        self.discard_orphans(&rows).await;
        let deleted = self.storm.delete_where(&self.session_query(master_type, session_key)).await?;
        debug!("cancelled {} deferred binding(s) for {} (session {})", deleted, master_type, session_key);
        Ok(deleted)
    }

    /// Discard bindings older than `days` (the configured retention when
    /// `None`), deleting orphaned dependent slaves like `cancel`
    pub async fn clean_up(&self, days: Option<i64>) -> ModelResult<u64> {
        let days = days.unwrap_or(*self.storm.config().get_binding_retention_days());
        let cutoff = Utc::now() - Duration::days(days);
        let query = Query::table(self.table()).older_than("created_at", cutoff);

        let rows: Vec<DeferredBinding> = self
            .storm
            .select(&query)
            .await?
            .iter()
            .map(DeferredBinding::from_row)
            .collect::<ModelResult<_>>()?;
        if rows.is_empty() {
            return Ok(0);
        }

        self.discard_orphans(&rows).await;
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.id).collect();
        let deleted = self.delete_rows(&ids).await?;
        info!("cleaned up {} deferred binding(s) older than {} day(s)", deleted, days);
        Ok(deleted)
    }

    async fn delete_rows(&self, ids: &[i64]) -> ModelResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.iter().map(|id| Value::from(*id)).collect();
        self.storm.delete_where(&Query::table(self.table()).where_in("id", ids)).await
    }

    async fn discard_orphans(&self, rows: &[DeferredBinding]) {
        let mut seen = HashSet::new();
        for binding in rows.iter().filter(|b| b.is_bind) {
            if !seen.insert((binding.slave_type.clone(), binding.slave_id.clone())) {
                continue;
            }
            if let Err(e) = self.delete_orphaned_slave(binding).await {
                warn!(
                    "failed to discard orphaned {}#{}: {}",
                    binding.slave_type, binding.slave_id, e
                );
            }
        }
    }

    /// Delete the bound slave when its relation is dependent and it was
    /// never given an owner
    async fn delete_orphaned_slave(&self, binding: &DeferredBinding) -> ModelResult<bool> {
        let Some(master) = self.storm.schemas().find(&binding.master_type) else {
            return Ok(false);
        };
        let Some(definition) = master.get_relation(&binding.master_field) else {
            return Ok(false);
        };
        if !definition.flags.dependent || !definition.kind.related_holds_key() {
            return Ok(false);
        }
        if self.storm.schemas().find(&binding.slave_type).is_none() {
            return Ok(false);
        }
        let Some(slave) = self
            .storm
            .find_with_trashed(&binding.slave_type, Value::from(binding.slave_id.as_str()))
            .await?
        else {
            return Ok(false);
        };

        let owner_column = definition.foreign_key(&master);
        if !slave.get(&owner_column).is_null() {
            return Ok(false);
        }
        debug!("deleting orphaned {}#{}", binding.slave_type, binding.slave_id);
        self.storm.delete(&slave).await
    }
}
