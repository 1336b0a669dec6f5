use crate::error::{ModelError, ModelResult};
use crate::value::{is_truthy, value_text, Row};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One row of the deferred binding ledger: a pending add (`is_bind`) or
/// remove of `slave` to or from relation `master_field` of a `master_type`
/// parent, scoped to `session_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredBinding {
    pub id: Option<i64>,
    pub master_type: String,
    pub master_field: String,
    pub slave_type: String,
    pub slave_id: String,
    pub session_key: String,
    pub pivot_data: Row,
    pub is_bind: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeferredBinding {
    pub fn new(
        master_type: &str,
        master_field: &str,
        slave_type: &str,
        slave_id: &str,
        session_key: &str,
        is_bind: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            master_type: master_type.to_string(),
            master_field: master_field.to_string(),
            slave_type: slave_type.to_string(),
            slave_id: slave_id.to_string(),
            session_key: session_key.to_string(),
            pivot_data: Row::new(),
            is_bind,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_pivot(mut self, pivot: Row) -> Self {
        self.pivot_data = pivot;
        self
    }

    /// `(master_field, slave_type, slave_id)`: rows sharing it cancel or
    /// repeat each other
    pub fn target(&self) -> (&str, &str, &str) {
        (&self.master_field, &self.slave_type, &self.slave_id)
    }

    /// Row form; pivot data is stored as a JSON document in a text column
    pub fn to_row(&self) -> ModelResult<Row> {
        let mut row = Row::new();
        if let Some(id) = self.id {
            row.insert("id".into(), Value::from(id));
        }
        row.insert("master_type".into(), Value::from(self.master_type.as_str()));
        row.insert("master_field".into(), Value::from(self.master_field.as_str()));
        row.insert("slave_type".into(), Value::from(self.slave_type.as_str()));
        row.insert("slave_id".into(), Value::from(self.slave_id.as_str()));
        row.insert("session_key".into(), Value::from(self.session_key.as_str()));
        let pivot = if self.pivot_data.is_empty() {
            Value::Null
        } else {
            Value::String(serde_json::to_string(&self.pivot_data)?)
        };
        row.insert("pivot_data".into(), pivot);
        row.insert("is_bind".into(), Value::Bool(self.is_bind));
        row.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        row.insert("updated_at".into(), Value::String(self.updated_at.to_rfc3339()));
        Ok(row)
    }

    pub fn from_row(row: &Row) -> ModelResult<Self> {
        let text = |column: &str| -> ModelResult<String> {
            row.get(column)
                .and_then(value_text)
                .ok_or_else(|| ModelError::Serialization(format!("deferred binding row lacks '{}'", column)))
        };
        let timestamp = |column: &str| {
            row.get(column)
                .and_then(value_text)
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now)
        };

        let pivot_data = match row.get("pivot_data") {
            Some(Value::String(json)) if !json.trim().is_empty() => match serde_json::from_str(json)? {
                Value::Object(map) => map,
                _ => Row::new(),
            },
            Some(Value::Object(map)) => map.clone(),
            _ => Row::new(),
        };

        Ok(Self {
            id: row.get("id").and_then(value_text).and_then(|id| id.parse().ok()),
            master_type: text("master_type")?,
            master_field: text("master_field")?,
            slave_type: text("slave_type")?,
            slave_id: text("slave_id")?,
            session_key: text("session_key")?,
            pivot_data,
            is_bind: row.get("is_bind").map(is_truthy).unwrap_or(false),
            created_at: timestamp("created_at"),
            updated_at: timestamp("updated_at"),
        })
    }
}

/// Rows of one `(master_field, slave_type, slave_id)` target and the net
/// operation they reduce to
#[derive(Debug, Clone, PartialEq)]
pub struct BindingGroup {
    pub rows: Vec<DeferredBinding>,
    /// `None` when the rows cancelled out
    pub net: Option<DeferredBinding>,
}

impl BindingGroup {
    pub fn row_ids(&self) -> Vec<i64> {
        self.rows.iter().filter_map(|r| r.id).collect()
    }

    /// Position used to replay groups: the net row's id, or the first row's
    fn order_id(&self) -> i64 {
        self.net
            .as_ref()
            .or_else(|| self.rows.first())
            .and_then(|r| r.id)
            .unwrap_or(i64::MAX)
    }
}

/// Reduce ledger rows to one net operation per target.
///
/// Rows are folded in id order: an opposite operation cancels the pending
/// one, a repeat of the pending operation is ignored. Groups come back in
/// replay order.
pub fn resolve_bindings(bindings: &[DeferredBinding]) -> Vec<BindingGroup> {
    let mut ordered: Vec<&DeferredBinding> = bindings.iter().collect();
    ordered.sort_by_key(|b| b.id.unwrap_or(i64::MAX));

    let mut index: HashMap<(String, String, String), usize> = HashMap::new();
    let mut groups: Vec<BindingGroup> = Vec::new();

    for binding in ordered {
        let (field, slave_type, slave_id) = binding.target();
        let key = (field.to_string(), slave_type.to_string(), slave_id.to_string());
        let position = *index.entry(key).or_insert_with(|| {
            groups.push(BindingGroup {
                rows: Vec::new(),
                net: None,
            });
            groups.len() - 1
        });

        let group = &mut groups[position];
        group.rows.push(binding.clone());
        group.net = match group.net.take() {
            None => Some(binding.clone()),
            Some(pending) if pending.is_bind != binding.is_bind => None,
            Some(pending) => Some(pending),
        };
    }

    groups.sort_by_key(BindingGroup::order_id);
    groups
}
