//! Schema registry - runtime lookup of model schemas by name

use super::schema::ModelSchema;
use crate::error::{ModelError, ModelResult};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Arc<DashMap<String, Arc<ModelSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a schema, replacing any previous one of the
    /// same name
    pub fn register(&self, schema: ModelSchema) -> ModelResult<Arc<ModelSchema>> {
        schema.validate()?;
        let schema = Arc::new(schema);
        self.schemas.insert(schema.name.clone(), schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> ModelResult<Arc<ModelSchema>> {
        self.find(name)
            .ok_or_else(|| ModelError::Schema(format!("model '{}' is not registered", name)))
    }

    pub fn find(&self, name: &str) -> Option<Arc<ModelSchema>> {
        self.schemas.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = SchemaRegistry::new();
        registry.register(ModelSchema::new("Post", "posts")).unwrap();
        registry.register(ModelSchema::new("Comment", "comments")).unwrap();

        assert!(registry.contains("Post"));
        assert_eq!(registry.get("Comment").unwrap().table, "comments");
        assert!(matches!(registry.get("Tag"), Err(ModelError::Schema(_))));
        assert_eq!(registry.names(), vec!["Comment", "Post"]);
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let registry = SchemaRegistry::new();
        assert!(registry.register(ModelSchema::new("Post", "")).is_err());
    }
}
