//! Attribute rows and key helpers

use serde_json::Value;
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;

/// Column name to value map; the unit every record store reads and writes
pub type Row = serde_json::Map<String, Value>;

/// Boxed future used by the recursive persistence paths
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Text form of a scalar value, `None` for null.
///
/// Keys are compared through this form so that `1` and `"1"` match, which is
/// how ledger rows (text `slave_id`) meet integer primary keys.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Text form of a key; empty strings count as missing
pub fn key_string(value: &Value) -> Option<String> {
    value_text(value).filter(|s| !s.is_empty())
}

/// Loose equality of two keys
pub fn keys_equal(a: &Value, b: &Value) -> bool {
    match (key_string(a), key_string(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Ordering used for in-memory sorting: nulls first, numbers numerically,
/// everything else by text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .unwrap_or(0.0)
                    .partial_cmp(&y.as_f64().unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => value_text(a).cmp(&value_text(b)),
    }
}

/// Truthiness of a stored flag (`true`, `1`, `"1"`, `"true"`)
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "t" | "yes"),
        _ => false,
    }
}

/// `BlogPost` -> `blog_post`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
