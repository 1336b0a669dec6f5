//! Record stores
//!
//! The persistence context talks to storage through `RecordStore`, which
//! moves plain JSON rows. `MemoryStore` keeps tables in process and
//! `PgStore` maps rows onto PostgreSQL tables.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::ModelResult;
use crate::query::Query;
use crate::value::Row;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a row and return it as stored, including a generated key
    /// when `key_name` was absent or null.
    async fn insert(&self, table: &str, key_name: &str, row: Row) -> ModelResult<Row>;

    /// Assign `values` to every row matching the query
    async fn update(&self, query: &Query, values: Row) -> ModelResult<u64>;

    /// Delete every row matching the query
    async fn delete(&self, query: &Query) -> ModelResult<u64>;

    /// Matching rows in query order
    async fn select(&self, query: &Query) -> ModelResult<Vec<Row>>;

    /// Matching rows grouped by `column`, with the row count of each group
    async fn count_by(&self, query: &Query, column: &str) -> ModelResult<Vec<(Value, i64)>>;
}
