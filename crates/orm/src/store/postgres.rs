//! PostgreSQL record store
//!
//! Rows travel as `jsonb`: inserts and updates go through
//! `jsonb_populate_record`, reads come back through `to_jsonb`. Values are
//! always bound; identifiers are validated and quoted.

use super::RecordStore;
use crate::config::OrmConfig;
use crate::error::{ModelError, ModelResult};
use crate::migration::Migration;
use crate::query::{Condition, Direction, Query};
use crate::security::quote_identifier;
use crate::value::{value_text, Row};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row as _};
use tracing::{debug, info};

const MIGRATIONS_TABLE: &str = "storm_migrations";

/// Bound parameter of a rendered statement
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Text(String),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

#[derive(Debug, Default)]
pub(crate) struct SqlBuilder {
    pub(crate) params: Vec<SqlParam>,
}

impl SqlBuilder {
    fn param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn condition(&mut self, condition: &Condition) -> ModelResult<String> {
        Ok(match condition {
            Condition::Eq(column, value) => match value_text(value) {
                None => format!("{} IS NULL", quote_identifier(column)?),
                Some(text) => format!(
                    "{}::text = {}",
                    quote_identifier(column)?,
                    self.param(SqlParam::Text(text))
                ),
            },
            Condition::NotEq(column, value) => match value_text(value) {
                None => format!("{} IS NOT NULL", quote_identifier(column)?),
                Some(text) => format!(
                    "{}::text <> {}",
                    quote_identifier(column)?,
                    self.param(SqlParam::Text(text))
                ),
            },
            Condition::In(column, values) => {
                let texts: Vec<String> = values.iter().filter_map(value_text).collect();
                if texts.is_empty() {
                    "FALSE".to_string()
                } else {
                    format!(
                        "{}::text = ANY({})",
                        quote_identifier(column)?,
                        self.param(SqlParam::TextArray(texts))
                    )
                }
            }
            Condition::NotIn(column, values) => {
                let texts: Vec<String> = values.iter().filter_map(value_text).collect();
                if texts.is_empty() {
                    format!("{} IS NOT NULL", quote_identifier(column)?)
                } else {
                    format!(
                        "{}::text <> ALL({})",
                        quote_identifier(column)?,
                        self.param(SqlParam::TextArray(texts))
                    )
                }
            }
            Condition::Null(column) => format!("{} IS NULL", quote_identifier(column)?),
            Condition::NotNull(column) => format!("{} IS NOT NULL", quote_identifier(column)?),
            Condition::OlderThan(column, instant) => format!(
                "{} < {}",
                quote_identifier(column)?,
                self.param(SqlParam::Timestamp(*instant))
            ),
            Condition::Any(conditions) => {
                if conditions.is_empty() {
                    "FALSE".to_string()
                } else {
                    let parts = conditions
                        .iter()
                        .map(|c| self.condition(c))
                        .collect::<ModelResult<Vec<_>>>()?;
                    format!("({})", parts.join(" OR "))
                }
            }
            Condition::All(conditions) => {
                if conditions.is_empty() {
                    "TRUE".to_string()
                } else {
                    let parts = conditions
                        .iter()
                        .map(|c| self.condition(c))
                        .collect::<ModelResult<Vec<_>>>()?;
                    format!("({})", parts.join(" AND "))
                }
            }
        })
    }

    fn where_clause(&mut self, conditions: &[Condition]) -> ModelResult<String> {
        if conditions.is_empty() {
            return Ok(String::new());
        }
        let parts = conditions
            .iter()
            .map(|c| self.condition(c))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(format!(" WHERE {}", parts.join(" AND ")))
    }

    fn order_clause(query: &Query) -> ModelResult<String> {
        if query.orders.is_empty() {
            return Ok(String::new());
        }
        let parts = query
            .orders
            .iter()
            .map(|order| {
                Ok(format!(
                    "{} {}",
                    quote_identifier(&order.column)?,
                    match order.direction {
                        Direction::Asc => "ASC NULLS FIRST",
                        Direction::Desc => "DESC NULLS LAST",
                    }
                ))
            })
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(format!(" ORDER BY {}", parts.join(", ")))
    }

    pub(crate) fn select(query: &Query) -> ModelResult<(String, Vec<SqlParam>)> {
        let mut builder = Self::default();
        let table = quote_identifier(&query.table)?;
        let mut sql = format!("SELECT to_jsonb(r) AS row FROM {} AS r", table);
        sql.push_str(&builder.where_clause(&query.conditions)?);
        sql.push_str(&Self::order_clause(query)?);
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok((sql, builder.params))
    }

    pub(crate) fn insert(table: &str, key_name: &str, row: &Row) -> ModelResult<(String, Vec<SqlParam>)> {
        let mut builder = Self::default();
        let quoted_table = quote_identifier(table)?;
        let columns = row
            .iter()
            .filter(|(column, value)| !(column.as_str() == key_name && value.is_null()))
            .map(|(column, _)| quote_identifier(column))
            .collect::<ModelResult<Vec<_>>>()?;

        let sql = if columns.is_empty() {
            format!(
                "WITH inserted AS (INSERT INTO {} DEFAULT VALUES RETURNING *) \
                 SELECT to_jsonb(inserted) AS row FROM inserted",
                quoted_table
            )
        } else {
            let list = columns.join(", ");
            let source = builder.param(SqlParam::Json(Value::Object(row.clone())));
            format!(
                "WITH inserted AS (INSERT INTO {t} ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{t}, {source}) RETURNING *) \
                 SELECT to_jsonb(inserted) AS row FROM inserted",
                t = quoted_table,
                list = list,
                source = source
            )
        };
        Ok((sql, builder.params))
    }

    pub(crate) fn update(query: &Query, values: &Row) -> ModelResult<(String, Vec<SqlParam>)> {
        let mut builder = Self::default();
        let table = quote_identifier(&query.table)?;
        let source = builder.param(SqlParam::Json(Value::Object(values.clone())));
        let assignments = values
            .keys()
            .map(|column| {
                let quoted = quote_identifier(column)?;
                Ok(format!(
                    "{c} = (SELECT {c} FROM jsonb_populate_record(NULL::{t}, {s}))",
                    c = quoted,
                    t = table,
                    s = source
                ))
            })
            .collect::<ModelResult<Vec<_>>>()?;

        let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
        sql.push_str(&builder.where_clause(&query.conditions)?);
        Ok((sql, builder.params))
    }

    pub(crate) fn delete(query: &Query) -> ModelResult<(String, Vec<SqlParam>)> {
        let mut builder = Self::default();
        let mut sql = format!("DELETE FROM {}", quote_identifier(&query.table)?);
        sql.push_str(&builder.where_clause(&query.conditions)?);
        Ok((sql, builder.params))
    }

    pub(crate) fn count_by(query: &Query, column: &str) -> ModelResult<(String, Vec<SqlParam>)> {
        let mut builder = Self::default();
        let quoted = quote_identifier(column)?;
        let mut sql = format!(
            "SELECT {c}::text AS key, COUNT(*) AS total FROM {t}",
            c = quoted,
            t = quote_identifier(&query.table)?
        );
        sql.push_str(&builder.where_clause(&query.conditions)?);
        sql.push_str(&format!(" GROUP BY {}", quoted));
        Ok((sql, builder.params))
    }
}

fn bind_params(
    mut query: sqlx::query::Query<'_, Postgres, PgArguments>,
    params: Vec<SqlParam>,
) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(text) => query.bind(text),
            SqlParam::TextArray(texts) => query.bind(texts),
            SqlParam::Timestamp(instant) => query.bind(instant),
            SqlParam::Json(value) => query.bind(sqlx::types::Json(value)),
        };
    }
    query
}

fn row_from_json(value: Value) -> ModelResult<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ModelError::Serialization(format!(
            "expected a JSON object row, got {}",
            other
        ))),
    }
}

/// Record store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from `database_url` and `max_connections`
    pub async fn connect(config: &OrmConfig) -> ModelResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(*config.get_max_connections())
            .connect(config.get_database_url())
            .await?;
        info!("Connected record store (max {} connections)", config.get_max_connections());
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply migrations that are not yet recorded, each in its own
    /// transaction. Returns the ids applied by this call.
    pub async fn migrate(&self, migrations: &[Migration]) -> ModelResult<Vec<String>> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (id VARCHAR(255) PRIMARY KEY, applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            MIGRATIONS_TABLE
        ))
        .execute(&self.pool)
        .await?;

        let applied: Vec<String> = sqlx::query_scalar(&format!("SELECT id FROM {}", MIGRATIONS_TABLE))
            .fetch_all(&self.pool)
            .await?;

        let mut newly_applied = Vec::new();
        for migration in migrations.iter().filter(|m| !applied.contains(&m.id)) {
            let mut transaction = self.pool.begin().await?;

            for statement in migration.up_statements() {
                sqlx::query(&statement)
                    .execute(&mut *transaction)
                    .await
                    .map_err(|e| {
                        ModelError::Schema(format!(
                            "Failed to execute migration {}: {}",
                            migration.id, e
                        ))
                    })?;
            }

            let recorded = sqlx::query(&format!("INSERT INTO {} (id) VALUES ($1)", MIGRATIONS_TABLE))
                .bind(&migration.id)
                .execute(&mut *transaction)
                .await;

            match recorded {
                Ok(_) => {
                    transaction.commit().await?;
                    info!("Applied migration {} - {}", migration.id, migration.name);
                    newly_applied.push(migration.id.clone());
                }
                // Another process recorded it first
                Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                    transaction.rollback().await?;
                    debug!("Migration {} already recorded", migration.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(newly_applied)
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert(&self, table: &str, key_name: &str, row: Row) -> ModelResult<Row> {
        let (sql, params) = SqlBuilder::insert(table, key_name, &row)?;
        let result = bind_params(sqlx::query(&sql), params)
            .fetch_one(&self.pool)
            .await?;
        row_from_json(result.try_get::<Value, _>("row")?)
    }

    async fn update(&self, query: &Query, values: Row) -> ModelResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let (sql, params) = SqlBuilder::update(query, &values)?;
        let result = bind_params(sqlx::query(&sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, query: &Query) -> ModelResult<u64> {
        let (sql, params) = SqlBuilder::delete(query)?;
        let result = bind_params(sqlx::query(&sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn select(&self, query: &Query) -> ModelResult<Vec<Row>> {
        let (sql, params) = SqlBuilder::select(query)?;
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row_from_json(row.try_get::<Value, _>("row")?))
            .collect()
    }

    async fn count_by(&self, query: &Query, column: &str) -> ModelResult<Vec<(Value, i64)>> {
        let (sql, params) = SqlBuilder::count_by(query, column)?;
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let key: Option<String> = row.try_get("key")?;
                let total: i64 = row.try_get("total")?;
                Ok((key.map(Value::String).unwrap_or(Value::Null), total))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_select() {
        let query = Query::table("deferred_bindings")
            .where_eq("master_type", "Post")
            .where_in("slave_id", vec![json!(1), json!("2")])
            .where_null("deleted_at")
            .order_by("id")
            .limit(10);

        let (sql, params) = SqlBuilder::select(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT to_jsonb(r) AS row FROM \"deferred_bindings\" AS r WHERE \"master_type\"::text = $1 \
             AND \"slave_id\"::text = ANY($2) AND \"deleted_at\" IS NULL ORDER BY \"id\" ASC NULLS FIRST LIMIT 10"
        );
        assert_eq!(
            params,
            vec![
                SqlParam::Text("Post".to_string()),
                SqlParam::TextArray(vec!["1".to_string(), "2".to_string()]),
            ]
        );
    }

    #[test]
    fn test_render_nested_conditions() {
        let query = Query::table("files").filter(Condition::Any(vec![
            Condition::In("id".into(), vec![json!(5)]),
            Condition::All(vec![Condition::eq("attachment_id", 1), Condition::eq("field", "photos")]),
        ]));
        let (sql, params) = SqlBuilder::select(&query).unwrap();
        assert!(sql.contains("WHERE (\"id\"::text = ANY($1) OR (\"attachment_id\"::text = $2 AND \"field\"::text = $3))"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_render_empty_sets() {
        let query = Query::table("files")
            .filter(Condition::never())
            .where_not_in("id", vec![]);
        let (sql, params) = SqlBuilder::select(&query).unwrap();
        assert!(sql.ends_with("WHERE FALSE AND \"id\" IS NOT NULL"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_insert_skips_null_key() {
        let row = json!({"id": null, "title": "hello"}).as_object().cloned().unwrap();
        let (sql, params) = SqlBuilder::insert("posts", "id", &row).unwrap();
        assert!(sql.contains("INSERT INTO \"posts\" (\"title\") SELECT \"title\" FROM jsonb_populate_record(NULL::\"posts\", $1)"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_render_update_and_delete() {
        let values = json!({"sort_order": 3}).as_object().cloned().unwrap();
        let query = Query::table("system_files").where_eq("id", 9);
        let (sql, params) = SqlBuilder::update(&query, &values).unwrap();
        assert_eq!(
            sql,
            "UPDATE \"system_files\" SET \"sort_order\" = (SELECT \"sort_order\" FROM jsonb_populate_record(NULL::\"system_files\", $1)) WHERE \"id\"::text = $2"
        );
        assert_eq!(params.len(), 2);

        let (sql, _) = SqlBuilder::delete(&query).unwrap();
        assert_eq!(sql, "DELETE FROM \"system_files\" WHERE \"id\"::text = $1");
    }

    #[test]
    fn test_render_rejects_bad_identifiers() {
        let query = Query::table("files; DROP TABLE files");
        assert!(SqlBuilder::select(&query).is_err());
    }

    #[test]
    fn test_render_count_by() {
        let query = Query::table("comments").where_not_null("post_id");
        let (sql, _) = SqlBuilder::count_by(&query, "post_id").unwrap();
        assert_eq!(
            sql,
            "SELECT \"post_id\"::text AS key, COUNT(*) AS total FROM \"comments\" WHERE \"post_id\" IS NOT NULL GROUP BY \"post_id\""
        );
    }
}
