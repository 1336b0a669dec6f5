#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use storm_orm::{MemoryStore, ModelSchema, OrmConfig, RelationDefinition, Row, Storm};

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

/// A blog schema covering every relation family
pub fn blog() -> Storm {
    blog_on(Arc::new(MemoryStore::new()), OrmConfig::default())
}

/// The blog schema over a store other contexts may share
pub fn blog_on(store: Arc<MemoryStore>, config: OrmConfig) -> Storm {
    let storm = Storm::new(store, config);

    storm
        .register(
            ModelSchema::new("Post", "posts")
                .relation(RelationDefinition::has_many("comments", "Comment"))
                .relation(RelationDefinition::has_many("comment_count", "Comment").count_only(true))
                .relation(RelationDefinition::has_many("notes", "Note").dependent(true))
                .relation(RelationDefinition::belongs_to("author", "User"))
                .relation(RelationDefinition::belongs_to_many("tags", "Tag").pivot(&["role"]))
                .relation(RelationDefinition::attach_many("images", "Image"))
                .relation(RelationDefinition::attach_one("cover", "Image").public(false)),
        )
        .unwrap();
    storm.register(ModelSchema::new("Comment", "comments")).unwrap();
    storm.register(ModelSchema::new("Note", "notes")).unwrap();
    storm.register(ModelSchema::new("User", "users")).unwrap();
    storm.register(ModelSchema::new("Tag", "tags")).unwrap();
    storm
        .register(ModelSchema::new("Image", "images").relation(RelationDefinition::morph_to("attachment")))
        .unwrap();

    storm
        .register(
            ModelSchema::new("Author", "authors")
                .soft_deletes()
                .relation(RelationDefinition::has_many("books", "Book").soft_delete(true)),
        )
        .unwrap();
    storm.register(ModelSchema::new("Book", "books").soft_deletes()).unwrap();

    storm
}

pub async fn create(storm: &Storm, model: &str, attributes: Value) -> storm_orm::Record {
    let record = storm.make(model, row(attributes)).unwrap();
    storm.save(&record, None).await.unwrap();
    record
}
