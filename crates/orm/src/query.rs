//! Store-neutral query description
//!
//! A `Query` names a table, a conjunction of conditions, an ordering and an
//! optional limit. The memory store evaluates it directly; the PostgreSQL
//! store renders it to SQL. Values compare by their text form, so integer
//! keys match the text columns of the deferred binding ledger.

use crate::value::{compare_values, value_text, Row};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;

/// A single filter predicate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Condition {
    Eq(String, Value),
    NotEq(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    Null(String),
    NotNull(String),
    /// Timestamp column strictly before the given instant
    OlderThan(String, DateTime<Utc>),
    /// Disjunction; empty means false
    Any(Vec<Condition>),
    /// Conjunction; empty means true
    All(Vec<Condition>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In(column.into(), values)
    }

    /// Condition no row satisfies
    pub fn never() -> Self {
        Condition::Any(Vec::new())
    }

    /// Evaluate against a row; missing columns read as null
    pub fn matches(&self, row: &Row) -> bool {
        let text_of = |column: &str| row.get(column).and_then(value_text);

        match self {
            Condition::Eq(column, expected) => match value_text(expected) {
                None => text_of(column).is_none(),
                Some(expected) => text_of(column).as_deref() == Some(expected.as_str()),
            },
            Condition::NotEq(column, expected) => match (text_of(column), value_text(expected)) {
                (Some(actual), Some(expected)) => actual != expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Condition::In(column, values) => match text_of(column) {
                Some(actual) => values.iter().filter_map(value_text).any(|v| v == actual),
                None => false,
            },
            Condition::NotIn(column, values) => match text_of(column) {
                Some(actual) => !values.iter().filter_map(value_text).any(|v| v == actual),
                None => false,
            },
            Condition::Null(column) => text_of(column).is_none(),
            Condition::NotNull(column) => text_of(column).is_some(),
            Condition::OlderThan(column, instant) => text_of(column)
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|at| at.with_timezone(&Utc) < *instant)
                .unwrap_or(false),
            Condition::Any(conditions) => conditions.iter().any(|c| c.matches(row)),
            Condition::All(conditions) => conditions.iter().all(|c| c.matches(row)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Select/update/delete target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub table: String,
    pub conditions: Vec<Condition>,
    pub orders: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            conditions: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Condition::Eq(column.into(), value.into()))
    }

    pub fn where_not_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Condition::NotEq(column.into(), value.into()))
    }

    pub fn where_in(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Condition::In(column.into(), values))
    }

    pub fn where_not_in(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Condition::NotIn(column.into(), values))
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.filter(Condition::Null(column.into()))
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.filter(Condition::NotNull(column.into()))
    }

    pub fn older_than(self, column: impl Into<String>, instant: DateTime<Utc>) -> Self {
        self.filter(Condition::OlderThan(column.into(), instant))
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.orders.push(OrderBy::asc(column));
        self
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.orders.push(OrderBy::desc(column));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when every condition holds for the row
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Stable sort by the query's ordering
    pub fn sort(&self, rows: &mut [Row]) {
        if self.orders.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for order in &self.orders {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let ordering = match order.direction {
                    Direction::Asc => compare_values(left, right),
                    Direction::Desc => compare_values(right, left),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Key identifying this query in the identity cache
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[test]
    fn test_eq_matches_loosely() {
        let r = row(json!({"slave_id": "12", "is_bind": true}));
        assert!(Condition::eq("slave_id", 12).matches(&r));
        assert!(Condition::eq("is_bind", true).matches(&r));
        assert!(!Condition::eq("slave_id", 13).matches(&r));
        assert!(Condition::eq("missing", Value::Null).matches(&r));
    }

    #[test]
    fn test_not_eq_and_not_in_skip_nulls() {
        let r = row(json!({"post_id": null}));
        assert!(!Condition::NotEq("post_id".into(), json!(1)).matches(&r));
        assert!(!Condition::NotIn("post_id".into(), vec![json!(1)]).matches(&r));
    }

    #[test]
    fn test_any_and_all() {
        let r = row(json!({"id": 3}));
        assert!(!Condition::never().matches(&r));
        assert!(Condition::All(vec![]).matches(&r));
        assert!(Condition::Any(vec![Condition::eq("id", 1), Condition::eq("id", 3)]).matches(&r));
    }

    #[test]
    fn test_older_than() {
        let old = (Utc::now() - Duration::days(10)).to_rfc3339();
        let r = row(json!({"created_at": old}));
        assert!(Condition::OlderThan("created_at".into(), Utc::now() - Duration::days(5)).matches(&r));
        assert!(!Condition::OlderThan("created_at".into(), Utc::now() - Duration::days(20)).matches(&r));
    }

    #[test]
    fn test_sort_multiple_columns() {
        let query = Query::table("files").order_by("sort_order").order_by_desc("id");
        let mut rows = vec![
            row(json!({"id": 1, "sort_order": 2})),
            row(json!({"id": 2, "sort_order": 1})),
            row(json!({"id": 3, "sort_order": 1})),
        ];
        query.sort(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(2), json!(1)]);
    }

    #[test]
    fn test_fingerprint_differs_by_condition() {
        let a = Query::table("posts").where_eq("id", 1);
        let b = Query::table("posts").where_eq("id", 2);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }
}
