use crate::model::Record;
use serde_json::Value;

/// Input accepted by `set_simple_value`: nothing, a key, a record, or a list
/// of those
#[derive(Debug, Clone)]
pub enum RelationValue {
    Null,
    Key(Value),
    Record(Record),
    Many(Vec<RelationValue>),
}

impl RelationValue {
    /// Null, and also an empty list
    pub fn is_empty(&self) -> bool {
        match self {
            RelationValue::Null => true,
            RelationValue::Many(items) => items.iter().all(RelationValue::is_empty),
            RelationValue::Key(Value::Null) => true,
            _ => false,
        }
    }

    /// Leaf values in order, nested lists flattened and nulls dropped
    pub fn flatten(self) -> Vec<RelationValue> {
        match self {
            RelationValue::Many(items) => items.into_iter().flat_map(RelationValue::flatten).collect(),
            value if value.is_empty() => Vec::new(),
            value => vec![value],
        }
    }
}

impl From<Value> for RelationValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RelationValue::Null,
            Value::Array(items) => RelationValue::Many(items.into_iter().map(RelationValue::from).collect()),
            other => RelationValue::Key(other),
        }
    }
}

impl From<Record> for RelationValue {
    fn from(record: Record) -> Self {
        RelationValue::Record(record)
    }
}

impl From<&Record> for RelationValue {
    fn from(record: &Record) -> Self {
        RelationValue::Record(record.clone())
    }
}

impl From<Vec<Record>> for RelationValue {
    fn from(records: Vec<Record>) -> Self {
        RelationValue::Many(records.into_iter().map(RelationValue::Record).collect())
    }
}

impl From<Option<Record>> for RelationValue {
    fn from(record: Option<Record>) -> Self {
        record.map(RelationValue::Record).unwrap_or(RelationValue::Null)
    }
}

impl From<i64> for RelationValue {
    fn from(key: i64) -> Self {
        RelationValue::Key(Value::from(key))
    }
}

impl From<&str> for RelationValue {
    fn from(key: &str) -> Self {
        RelationValue::Key(Value::from(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        assert!(matches!(RelationValue::from(json!(null)), RelationValue::Null));
        assert!(matches!(RelationValue::from(json!(3)), RelationValue::Key(_)));

        let flat = RelationValue::from(json!([1, null, [2, 3]])).flatten();
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_empty_list_is_empty() {
        assert!(RelationValue::Many(vec![]).is_empty());
        assert!(RelationValue::Many(vec![RelationValue::Null]).is_empty());
        assert!(!RelationValue::from(1).is_empty());
    }
}
