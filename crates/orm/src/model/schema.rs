//! Model schemas

use super::record::Record;
use crate::error::{ModelError, ModelResult};
use crate::relations::RelationDefinition;
use crate::value::snake_case;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Primitive form of a record when it appears as a relation's simple value.
/// Without a presenter the record's key is used.
pub trait RecordPresenter: Send + Sync {
    fn simple_value(&self, record: &Record) -> Value;
}

/// Everything the persistence context needs to know about one model
#[derive(Clone)]
pub struct ModelSchema {
    /// Model name, also stored in morph type and ledger type columns
    pub name: String,
    pub table: String,
    pub key_name: String,
    /// Maintain `created_at` / `updated_at`
    pub timestamps: bool,
    /// `delete` stamps `deleted_at` instead of removing the row
    pub soft_deletes: bool,
    /// Attributes never written to the store
    pub purgeable: Vec<String>,
    pub relations: Vec<RelationDefinition>,
    pub presenter: Option<Arc<dyn RecordPresenter>>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            key_name: "id".to_string(),
            timestamps: true,
            soft_deletes: false,
            purgeable: Vec::new(),
            relations: Vec::new(),
            presenter: None,
        }
    }

    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn soft_deletes(mut self) -> Self {
        self.soft_deletes = true;
        self
    }

    pub fn purgeable(mut self, attributes: &[&str]) -> Self {
        self.purgeable.extend(attributes.iter().map(|a| a.to_string()));
        self
    }

    pub fn relation(mut self, definition: RelationDefinition) -> Self {
        self.relations.push(definition);
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn RecordPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_relation(&self, name: &str) -> bool {
        self.get_relation(name).is_some()
    }

    /// Default foreign key other tables use to point at this model
    pub fn foreign_key(&self) -> String {
        format!("{}_{}", snake_case(&self.name), self.key_name)
    }

    pub fn is_purgeable(&self, attribute: &str) -> bool {
        self.purgeable.iter().any(|a| a == attribute)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.name.is_empty() || self.table.is_empty() || self.key_name.is_empty() {
            return Err(ModelError::Schema(format!(
                "model '{}' needs a name, a table and a key",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for relation in &self.relations {
            if !seen.insert(relation.name.as_str()) {
                return Err(ModelError::Schema(format!(
                    "relation '{}' is defined twice on '{}'",
                    relation.name, self.name
                )));
            }
            relation.validate()?;
        }
        Ok(())
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("key_name", &self.key_name)
            .field("timestamps", &self.timestamps)
            .field("soft_deletes", &self.soft_deletes)
            .field("relations", &self.relations.iter().map(|r| &r.name).collect::<Vec<_>>())
            .field("presenter", &self.presenter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_foreign_key() {
        let schema = ModelSchema::new("BlogPost", "posts");
        assert_eq!(schema.key_name, "id");
        assert!(schema.timestamps);
        assert!(!schema.soft_deletes);
        assert_eq!(schema.foreign_key(), "blog_post_id");
    }

    #[test]
    fn test_duplicate_relation_rejected() {
        let schema = ModelSchema::new("Post", "posts")
            .relation(RelationDefinition::has_many("comments", "Comment"))
            .relation(RelationDefinition::has_many("comments", "Comment"));
        assert!(matches!(schema.validate(), Err(ModelError::Schema(_))));
    }

    #[test]
    fn test_purgeable() {
        let schema = ModelSchema::new("File", "system_files").purgeable(&["data"]);
        assert!(schema.is_purgeable("data"));
        assert!(!schema.is_purgeable("file_name"));
    }
}
