//! The `File` model

use crate::config::FilesConfig;
use serde_json::Value;
use storm_orm::security::quote_identifier;
use storm_orm::{Migration, ModelResult, ModelSchema, Record, RecordPresenter, RelationDefinition, IS_PUBLIC};
use std::sync::Arc;

pub const FILE_MODEL: &str = "File";

pub const FILE_NAME: &str = "file_name";
pub const FILE_SIZE: &str = "file_size";
pub const CONTENT_TYPE: &str = "content_type";
pub const DISK_NAME: &str = "disk_name";
pub const TITLE: &str = "title";
pub const DESCRIPTION: &str = "description";
pub const FIELD: &str = "field";
pub const SORT_ORDER: &str = "sort_order";
/// Local path ingested on save, never stored
pub const DATA: &str = "data";

/// Presents a file as its URL, so an attachment relation's simple value is
/// the list of file URLs
struct FilePresenter {
    config: FilesConfig,
}

impl RecordPresenter for FilePresenter {
    fn simple_value(&self, record: &Record) -> Value {
        match record.get_str(DISK_NAME) {
            Some(disk_name) => {
                let is_public = record.get_bool(IS_PUBLIC).unwrap_or(true);
                Value::String(self.config.url(is_public, &disk_name))
            }
            None => Value::Null,
        }
    }
}

pub fn file_schema(config: &FilesConfig) -> ModelSchema {
    ModelSchema::new(FILE_MODEL, config.get_table().clone())
        .purgeable(&[DATA])
        .relation(RelationDefinition::morph_to("attachment"))
        .presenter(Arc::new(FilePresenter { config: config.clone() }))
}

/// Table of the `File` model
pub fn files_migration(table: &str) -> ModelResult<Migration> {
    let quoted = quote_identifier(table)?;
    let mut up = format!(
        "CREATE TABLE IF NOT EXISTS {quoted} (
    id BIGSERIAL PRIMARY KEY,
    disk_name VARCHAR(255) NOT NULL,
    file_name VARCHAR(255) NOT NULL,
    file_size BIGINT NOT NULL,
    content_type VARCHAR(255) NOT NULL,
    title VARCHAR(255) NULL,
    description TEXT NULL,
    field VARCHAR(255) NULL,
    attachment_id VARCHAR(255) NULL,
    attachment_type VARCHAR(255) NULL,
    is_public BOOLEAN NOT NULL DEFAULT TRUE,
    sort_order BIGINT NULL,
    created_at TIMESTAMPTZ NULL,
    updated_at TIMESTAMPTZ NULL
);"
    );
    for column in ["attachment_id", "attachment_type", "field"] {
        let index = quote_identifier(&format!("{}_{}_index", table, column))?;
        up.push_str(&format!("\nCREATE INDEX IF NOT EXISTS {index} ON {quoted} ({column});"));
    }

    Ok(Migration::new(
        format!("storm_create_{}", table),
        format!("Create {} table", table),
        up,
        format!("DROP TABLE IF EXISTS {quoted};"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_shape() {
        let schema = file_schema(&FilesConfig::default());
        assert_eq!(schema.table, "system_files");
        assert!(schema.is_purgeable(DATA));
        assert!(schema.has_relation("attachment"));
    }

    #[test]
    fn test_presenter_uses_visibility() {
        let schema = Arc::new(file_schema(&FilesConfig::default()));
        let record = Record::from_row(
            schema.clone(),
            json!({"id": 1, "disk_name": "ABCDE1234.png", "is_public": false})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let presenter = schema.presenter.clone().unwrap();
        assert_eq!(
            presenter.simple_value(&record),
            json!("/storage/app/uploads/protected/ABC/DE1/234/ABCDE1234.png")
        );
    }

    #[test]
    fn test_files_migration() {
        let migration = files_migration("system_files").unwrap();
        let statements = migration.up_statements();
        assert_eq!(statements.len(), 4);
        assert!(statements[0].contains("disk_name VARCHAR(255) NOT NULL"));
        assert!(files_migration("bad; table").is_err());
    }
}
