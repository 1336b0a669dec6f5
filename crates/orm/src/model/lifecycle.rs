//! One-shot continuations bound to a record's next save
//!
//! Relation mutations against a record without a primary key cannot be
//! applied yet. They are queued on the record under the lifecycle phase
//! that makes them applicable; `Storm::save` drains each phase once, in
//! registration order.

use super::record::{Record, WeakRecord};
use crate::relations::RelationValue;
use crate::value::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    BeforeSave,
    AfterSave,
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
}

impl LifecyclePhase {
    /// Phases drained before the row is written
    pub fn before(creating: bool) -> [LifecyclePhase; 2] {
        if creating {
            [LifecyclePhase::BeforeSave, LifecyclePhase::BeforeInsert]
        } else {
            [LifecyclePhase::BeforeSave, LifecyclePhase::BeforeUpdate]
        }
    }

    /// Phases drained after the row is written
    pub fn after(created: bool) -> [LifecyclePhase; 2] {
        if created {
            [LifecyclePhase::AfterSave, LifecyclePhase::AfterInsert]
        } else {
            [LifecyclePhase::AfterSave, LifecyclePhase::AfterUpdate]
        }
    }
}

#[derive(Debug, Clone)]
pub enum PendingAction {
    /// Re-run `set_simple_value` on a relation of the saved record
    SetSimpleValue { relation: String, value: RelationValue },
    /// Re-run `add` on a relation of the saved record
    Add {
        relation: String,
        related: Record,
        pivot: Row,
    },
    /// The saved record is the target of `target`'s to-one relation: copy
    /// its new key into `target`'s foreign key. No-op when the key already
    /// matches or `target` has been dropped.
    AssociateWhenSaved { target: WeakRecord, relation: String },
}
