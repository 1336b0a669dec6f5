//! Schema migrations for tables the library owns

use crate::security::quote_identifier;
use crate::error::ModelResult;
use serde::{Deserialize, Serialize};

/// Represents a database migration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    /// Unique identifier, recorded once applied
    pub id: String,
    /// Human-readable name for the migration
    pub name: String,
    /// SQL statements to apply the migration
    pub up_sql: String,
    /// SQL statements to roll the migration back
    pub down_sql: String,
}

impl Migration {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        up_sql: impl Into<String>,
        down_sql: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    /// Statements of `up_sql`, each terminated by `;`
    pub fn up_statements(&self) -> Vec<String> {
        split_sql_statements(&self.up_sql)
    }

    /// Statements of `down_sql`, each terminated by `;`
    pub fn down_statements(&self) -> Vec<String> {
        split_sql_statements(&self.down_sql)
    }
}

/// Split a script on semicolons. Migration scripts here never carry
/// semicolons inside literals.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{};", s))
        .collect()
}

/// Ledger table for deferred relation bindings
pub fn deferred_bindings_migration(table: &str) -> ModelResult<Migration> {
    let quoted = quote_identifier(table)?;
    let mut up = format!(
        "CREATE TABLE IF NOT EXISTS {quoted} (
    id BIGSERIAL PRIMARY KEY,
    master_type VARCHAR(255) NOT NULL,
    master_field VARCHAR(255) NOT NULL,
    slave_type VARCHAR(255) NOT NULL,
    slave_id VARCHAR(255) NOT NULL,
    session_key VARCHAR(255) NOT NULL,
    pivot_data TEXT NULL,
    is_bind BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NULL,
    updated_at TIMESTAMPTZ NULL
);"
    );
    for column in ["master_type", "master_field", "slave_type", "slave_id", "session_key"] {
        let index = quote_identifier(&format!("{}_{}_index", table, column))?;
        up.push_str(&format!(
            "\nCREATE INDEX IF NOT EXISTS {index} ON {quoted} ({column});"
        ));
    }

    Ok(Migration::new(
        format!("storm_create_{}", table),
        format!("Create {} table", table),
        up,
        format!("DROP TABLE IF EXISTS {quoted};"),
    ))
}
