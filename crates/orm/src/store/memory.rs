//! In-process record store

use super::RecordStore;
use crate::error::ModelResult;
use crate::query::Query;
use crate::value::{value_text, Row};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

/// Tables held in memory with auto-increment integer keys
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Copy of every row in a table, in insertion order
    pub fn dump(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: &str, key_name: &str, mut row: Row) -> ModelResult<Row> {
        let mut tables = self.tables.write();
        let table = tables.entry(table.to_string()).or_default();

        match row.get(key_name).and_then(|v| v.as_i64()) {
            Some(explicit) => table.next_id = table.next_id.max(explicit),
            None if row.get(key_name).map(|v| !v.is_null()).unwrap_or(false) => {}
            None => {
                table.next_id += 1;
                row.insert(key_name.to_string(), Value::from(table.next_id));
            }
        }

        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, query: &Query, values: Row) -> ModelResult<u64> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(&query.table) else {
            return Ok(0);
        };

        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|r| query.matches(r)) {
            for (column, value) in &values {
                row.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, query: &Query) -> ModelResult<u64> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(&query.table) else {
            return Ok(0);
        };

        let before = table.rows.len();
        table.rows.retain(|r| !query.matches(r));
        Ok((before - table.rows.len()) as u64)
    }

    async fn select(&self, query: &Query) -> ModelResult<Vec<Row>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(&query.table) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Row> = table.rows.iter().filter(|r| query.matches(r)).cloned().collect();
        query.sort(&mut rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count_by(&self, query: &Query, column: &str) -> ModelResult<Vec<(Value, i64)>> {
        let rows = self.select(&Query { limit: None, ..query.clone() }).await?;

        let mut groups: Vec<(Value, i64)> = Vec::new();
        for row in rows {
            let key = row.get(column).cloned().unwrap_or(Value::Null);
            match groups
                .iter_mut()
                .find(|(existing, _)| value_text(existing) == value_text(&key))
            {
                Some((_, count)) => *count += 1,
                None => groups.push((key, 1)),
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_insert_generates_keys() {
        let store = MemoryStore::new();
        let first = store.insert("posts", "id", row(json!({"title": "a"}))).await.unwrap();
        let second = store.insert("posts", "id", row(json!({"title": "b"}))).await.unwrap();

        assert_eq!(first["id"], json!(1));
        assert_eq!(second["id"], json!(2));
        assert_eq!(store.row_count("posts"), 2);
    }

    #[tokio::test]
    async fn test_explicit_key_advances_sequence() {
        let store = MemoryStore::new();
        store.insert("posts", "id", row(json!({"id": 10}))).await.unwrap();
        let next = store.insert("posts", "id", row(json!({"id": null}))).await.unwrap();
        assert_eq!(next["id"], json!(11));
    }

    #[tokio::test]
    async fn test_update_delete_select() {
        let store = MemoryStore::new();
        for title in ["a", "b", "c"] {
            store.insert("posts", "id", row(json!({"title": title}))).await.unwrap();
        }

        let changed = store
            .update(&Query::table("posts").where_in("id", vec![json!(1), json!(2)]), row(json!({"title": "z"})))
            .await
            .unwrap();
        assert_eq!(changed, 2);

        let rows = store
            .select(&Query::table("posts").where_eq("title", "z").order_by_desc("id"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!(2));

        let removed = store.delete(&Query::table("posts").where_eq("id", "3")).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.row_count("posts"), 2);
    }

    #[tokio::test]
    async fn test_count_by_groups() {
        let store = MemoryStore::new();
        for post in [1, 1, 2] {
            store.insert("comments", "id", row(json!({"post_id": post}))).await.unwrap();
        }

        let counts = store.count_by(&Query::table("comments"), "post_id").await.unwrap();
        assert_eq!(counts, vec![(json!(1), 2), (json!(2), 1)]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        let store = MemoryStore::new();
        assert!(store.select(&Query::table("nothing")).await.unwrap().is_empty());
        assert_eq!(store.delete(&Query::table("nothing")).await.unwrap(), 0);
    }
}
