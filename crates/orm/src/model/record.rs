//! Records
//!
//! A `Record` is a cheap, clonable handle to the shared state of one row.
//! Clones see the same attributes, so a relation can hold its parent by
//! reference while the caller keeps editing it. Guards on the state are
//! never held across an await.

use super::lifecycle::{LifecyclePhase, PendingAction};
use super::schema::{ModelSchema, DELETED_AT};
use crate::value::{key_string, keys_equal, Row};
use parking_lot::RwLock;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// In-memory contents of a loaded relation
#[derive(Debug, Clone)]
pub enum Loaded {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Loaded {
    pub fn records(&self) -> Vec<Record> {
        match self {
            Loaded::One(record) => record.iter().cloned().collect(),
            Loaded::Many(records) => records.clone(),
        }
    }
}

#[derive(Default)]
struct RecordState {
    attributes: Row,
    original: Row,
    exists: bool,
    relations: HashMap<String, Loaded>,
    pending: Vec<(LifecyclePhase, PendingAction)>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

#[derive(Clone)]
pub struct Record {
    state: Arc<RwLock<RecordState>>,
    schema: Arc<ModelSchema>,
}

/// Non-owning back-reference to a record
#[derive(Clone)]
pub struct WeakRecord {
    state: Weak<RwLock<RecordState>>,
    schema: Arc<ModelSchema>,
}

impl WeakRecord {
    pub fn upgrade(&self) -> Option<Record> {
        self.state.upgrade().map(|state| Record {
            state,
            schema: self.schema.clone(),
        })
    }
}

impl fmt::Debug for WeakRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakRecord({})", self.schema.name)
    }
}

impl Record {
    /// New, unsaved record
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RecordState::default())),
            schema,
        }
    }

    /// Record for a row read from the store
    pub fn from_row(schema: Arc<ModelSchema>, row: Row) -> Self {
        let state = RecordState {
            original: row.clone(),
            attributes: row,
            exists: true,
            ..RecordState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        &self.schema.name
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn key_name(&self) -> &str {
        &self.schema.key_name
    }

    /// Primary key, if set
    pub fn key(&self) -> Option<Value> {
        self.state
            .read()
            .attributes
            .get(&self.schema.key_name)
            .filter(|v| key_string(v).is_some())
            .cloned()
    }

    pub fn key_string(&self) -> Option<String> {
        self.key().as_ref().and_then(key_string)
    }

    /// Attribute value, null when absent
    pub fn get(&self, attribute: &str) -> Value {
        self.state
            .read()
            .attributes
            .get(attribute)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn get_str(&self, attribute: &str) -> Option<String> {
        match self.get(attribute) {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn get_i64(&self, attribute: &str) -> Option<i64> {
        match self.get(attribute) {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean attribute; null or absent reads as `None`
    pub fn get_bool(&self, attribute: &str) -> Option<bool> {
        match self.get(attribute) {
            Value::Null => None,
            other => Some(crate::value::is_truthy(&other)),
        }
    }

    /// Attribute present, even if null
    pub fn has(&self, attribute: &str) -> bool {
        self.state.read().attributes.contains_key(attribute)
    }

    pub fn set(&self, attribute: &str, value: impl Into<Value>) {
        self.state
            .write()
            .attributes
            .insert(attribute.to_string(), value.into());
    }

    pub fn unset(&self, attribute: &str) -> Option<Value> {
        self.state.write().attributes.remove(attribute)
    }

    pub fn fill(&self, row: Row) {
        let mut state = self.state.write();
        for (column, value) in row {
            state.attributes.insert(column, value);
        }
    }

    pub fn attributes(&self) -> Row {
        self.state.read().attributes.clone()
    }

    /// Value as last read from or written to the store
    pub fn original(&self, attribute: &str) -> Value {
        self.state
            .read()
            .original
            .get(attribute)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn exists(&self) -> bool {
        self.state.read().exists
    }

    /// Attributes changed since the last sync with the store
    pub fn dirty(&self) -> Row {
        let state = self.state.read();
        state
            .attributes
            .iter()
            .filter(|(column, value)| state.original.get(*column) != Some(*value))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Soft-deleted and not restored
    pub fn is_trashed(&self) -> bool {
        self.schema.soft_deletes && !self.get(DELETED_AT).is_null()
    }

    /// Merge the stored row into the attributes and mark the record clean
    pub(crate) fn mark_persisted(&self, row: Row) {
        let mut state = self.state.write();
        for (column, value) in row {
            state.attributes.insert(column, value);
        }
        state.original = state.attributes.clone();
        state.exists = true;
    }

    pub(crate) fn mark_deleted(&self) {
        self.state.write().exists = false;
    }

    pub fn sync_original(&self) {
        let mut state = self.state.write();
        state.original = state.attributes.clone();
    }

    pub fn set_relation(&self, name: &str, loaded: Loaded) {
        self.state.write().relations.insert(name.to_string(), loaded);
    }

    pub fn loaded_relation(&self, name: &str) -> Option<Loaded> {
        self.state.read().relations.get(name).cloned()
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.state.read().relations.contains_key(name)
    }

    pub fn unset_relation(&self, name: &str) {
        self.state.write().relations.remove(name);
    }

    pub fn loaded_relations(&self) -> Vec<(String, Loaded)> {
        let state = self.state.read();
        let mut loaded: Vec<_> = state
            .relations
            .iter()
            .map(|(name, loaded)| (name.clone(), loaded.clone()))
            .collect();
        loaded.sort_by(|a, b| a.0.cmp(&b.0));
        loaded
    }

    /// Queue a continuation for the next save reaching `phase`
    pub fn queue(&self, phase: LifecyclePhase, action: PendingAction) {
        self.state.write().pending.push((phase, action));
    }

    /// Remove and return the continuations queued for any of `phases`, in
    /// registration order
    pub fn take_pending(&self, phases: &[LifecyclePhase]) -> Vec<PendingAction> {
        let mut state = self.state.write();
        let queued = std::mem::take(&mut state.pending);
        let (taken, kept): (Vec<_>, Vec<_>) = queued
            .into_iter()
            .partition(|(phase, _)| phases.contains(phase));
        state.pending = kept;
        taken.into_iter().map(|(_, action)| action).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Attach typed side data (staged uploads, pivot rows)
    pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.state
            .write()
            .extensions
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.state
            .read()
            .extensions
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    }

    pub fn take_extension<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.state
            .write()
            .extensions
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn downgrade(&self) -> WeakRecord {
        WeakRecord {
            state: Arc::downgrade(&self.state),
            schema: self.schema.clone(),
        }
    }

    /// Same in-memory instance
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Same model and primary key
    pub fn is(&self, other: &Record) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.schema.name == other.schema.name
            && match (self.key(), other.key()) {
                (Some(a), Some(b)) => keys_equal(&a, &b),
                _ => false,
            }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Record")
            .field("model", &self.schema.name)
            .field("exists", &state.exists)
            .field("attributes", &state.attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RelationValue;
    use serde_json::json;

    fn schema() -> Arc<ModelSchema> {
        Arc::new(ModelSchema::new("Post", "posts").soft_deletes())
    }

    #[test]
    fn test_clones_share_state() {
        let record = Record::new(schema());
        let alias = record.clone();
        alias.set("title", "Hello");
        assert_eq!(record.get("title"), json!("Hello"));
        assert!(record.ptr_eq(&alias));
    }

    #[test]
    fn test_dirty_tracking() {
        let row = json!({"id": 1, "title": "a"}).as_object().cloned().unwrap();
        let record = Record::from_row(schema(), row);
        assert!(record.exists());
        assert!(!record.is_dirty());

        record.set("title", "b");
        let dirty = record.dirty();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty["title"], json!("b"));
        assert_eq!(record.original("title"), json!("a"));

        record.sync_original();
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_key_and_identity() {
        let a = Record::new(schema());
        assert!(a.key().is_none());
        a.set("id", 4);
        let b = Record::new(schema());
        b.set("id", "4");
        assert!(a.is(&b));
        assert_eq!(a.key_string().as_deref(), Some("4"));
    }

    #[test]
    fn test_take_pending_keeps_order_and_other_phases() {
        let record = Record::new(schema());
        record.queue(
            LifecyclePhase::AfterSave,
            PendingAction::SetSimpleValue { relation: "a".into(), value: RelationValue::Null },
        );
        record.queue(
            LifecyclePhase::BeforeSave,
            PendingAction::SetSimpleValue { relation: "b".into(), value: RelationValue::Null },
        );
        record.queue(
            LifecyclePhase::AfterInsert,
            PendingAction::SetSimpleValue { relation: "c".into(), value: RelationValue::Null },
        );

        let taken = record.take_pending(&[LifecyclePhase::AfterSave, LifecyclePhase::AfterInsert]);
        let names: Vec<_> = taken
            .iter()
            .map(|a| match a {
                PendingAction::SetSimpleValue { relation, .. } => relation.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(record.pending_count(), 1);
        assert!(record.take_pending(&[LifecyclePhase::AfterSave]).is_empty());
    }

    #[test]
    fn test_extensions() {
        #[derive(Clone, Debug, PartialEq)]
        struct Staged(String);

        let record = Record::new(schema());
        record.insert_extension(Staged("upload.png".into()));
        assert_eq!(record.extension::<Staged>(), Some(Staged("upload.png".into())));
        assert_eq!(record.take_extension::<Staged>(), Some(Staged("upload.png".into())));
        assert!(record.extension::<Staged>().is_none());
    }

    #[test]
    fn test_weak_record() {
        let record = Record::new(schema());
        let weak = record.downgrade();
        assert!(weak.upgrade().is_some());
        drop(record);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_trashed() {
        let record = Record::new(schema());
        assert!(!record.is_trashed());
        record.set(DELETED_AT, "2024-01-01T00:00:00+00:00");
        assert!(record.is_trashed());
    }
}
