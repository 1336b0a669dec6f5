mod common;

use common::{blog, create, row};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storm_orm::{
    EventOutcome, Loaded, ModelError, Pivot, Query, RelationEvent, RelationEventKind, Row, IS_PUBLIC,
};

#[tokio::test]
async fn test_add_to_unsaved_parent_runs_after_save() {
    let storm = blog();
    let post = storm.new_record("Post").unwrap();
    let comment = storm.make("Comment", row(json!({"body": "queued"}))).unwrap();

    storm.relation(&post, "comments").unwrap().add(&comment, None, Row::new()).await.unwrap();
    assert!(!comment.exists());
    assert_eq!(post.pending_count(), 1);

    storm.save(&post, None).await.unwrap();

    assert!(comment.exists());
    assert_eq!(comment.get("post_id"), post.key().unwrap());
    assert_eq!(post.pending_count(), 0);
}

#[tokio::test]
async fn test_association_with_unsaved_record_waits_for_its_key() {
    let storm = blog();
    let post = storm.new_record("Post").unwrap();
    let user = storm.make("User", row(json!({"name": "grace"}))).unwrap();

    storm.relation(&post, "author").unwrap().set_simple_value(&user).await.unwrap();
    assert!(post.get("author_id").is_null());

    storm.save(&post, None).await.unwrap();
    assert!(post.get("author_id").is_null());

    storm.save(&user, None).await.unwrap();
    assert_eq!(post.get("author_id"), user.key().unwrap());
    let stored = storm.find("Post", post.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.get("author_id"), user.key().unwrap());

    // the continuation runs once
    storm.save(&user, None).await.unwrap();
    assert_eq!(user.pending_count(), 0);
}

#[tokio::test]
async fn test_simple_values() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let user = create(&storm, "User", json!({"name": "u"})).await;

    let author = storm.relation(&post, "author").unwrap();
    author.set_simple_value(&user).await.unwrap();
    assert_eq!(author.get_simple_value(None).await.unwrap(), user.key().unwrap());
    author.set_simple_value(Value::Null).await.unwrap();
    assert!(author.get_simple_value(None).await.unwrap().is_null());

    let first = create(&storm, "Comment", json!({"body": "1"})).await;
    let second = create(&storm, "Comment", json!({"body": "2"})).await;
    let comments = storm.relation(&post, "comments").unwrap();
    comments
        .set_simple_value(json!([first.key().unwrap(), second.key().unwrap()]))
        .await
        .unwrap();
    assert_eq!(comments.get_simple_value(None).await.unwrap(), json!([1, 2]));

    comments.set_simple_value(vec![second.clone()]).await.unwrap();
    assert_eq!(comments.get_simple_value(None).await.unwrap(), json!([2]));
}

#[tokio::test]
async fn test_collection_value_on_unsaved_parent_is_queued() {
    let storm = blog();
    let post = storm.new_record("Post").unwrap();
    let a = storm.make("Comment", row(json!({"body": "a"}))).unwrap();
    let b = storm.make("Comment", row(json!({"body": "b"}))).unwrap();

    storm
        .relation(&post, "comments")
        .unwrap()
        .set_simple_value(vec![a.clone(), b.clone()])
        .await
        .unwrap();
    storm.save(&post, None).await.unwrap();

    let comments = storm.relation(&post, "comments").unwrap().get_results(None).await.unwrap();
    assert_eq!(comments.len(), 2);
}

#[tokio::test]
async fn test_remove_orphans_or_deletes() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;

    let comment = storm
        .relation(&post, "comments")
        .unwrap()
        .create(row(json!({"body": "c"})), None)
        .await
        .unwrap();
    assert_eq!(comment.get("post_id"), post.key().unwrap());
    storm.relation(&post, "comments").unwrap().remove(&comment, None).await.unwrap();
    let orphan = storm.find("Comment", comment.key().unwrap()).await.unwrap().unwrap();
    assert!(orphan.get("post_id").is_null());

    let note = storm
        .relation(&post, "notes")
        .unwrap()
        .create(row(json!({"text": "n"})), None)
        .await
        .unwrap();
    storm.relation(&post, "notes").unwrap().remove(&note, None).await.unwrap();
    assert!(storm.find("Note", note.key().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_ignores_non_members() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let other = create(&storm, "Post", json!({"title": "other"})).await;
    let note = storm
        .relation(&other, "notes")
        .unwrap()
        .create(row(json!({"text": "n"})), None)
        .await
        .unwrap();

    storm.relation(&post, "notes").unwrap().remove(&note, None).await.unwrap();
    assert!(storm.find("Note", note.key().unwrap()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_cascades_dependents_and_detaches_pivots() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let note = storm.relation(&post, "notes").unwrap().create(row(json!({})), None).await.unwrap();
    let comment = storm.relation(&post, "comments").unwrap().create(row(json!({})), None).await.unwrap();
    let tag = create(&storm, "Tag", json!({"name": "rust"})).await;
    storm.relation(&post, "tags").unwrap().add(&tag, None, Row::new()).await.unwrap();

    assert!(storm.delete(&post).await.unwrap());

    assert!(!post.exists());
    assert!(storm.find("Note", note.key().unwrap()).await.unwrap().is_none());
    assert!(storm.find("Comment", comment.key().unwrap()).await.unwrap().is_some());
    assert!(storm.find("Tag", tag.key().unwrap()).await.unwrap().is_some());
    assert!(storm.select(&Query::table("post_tag")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pivot_data_and_sync() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let rust = create(&storm, "Tag", json!({"name": "rust"})).await;
    let go = create(&storm, "Tag", json!({"name": "go"})).await;

    let tags = storm.relation(&post, "tags").unwrap();
    tags.add(&rust, None, row(json!({"role": "primary"}))).await.unwrap();
    // adding twice keeps one pivot row
    tags.add(&rust, None, Row::new()).await.unwrap();

    let loaded = tags.get_results(None).await.unwrap();
    assert_eq!(loaded.len(), 1);
    let pivot = loaded[0].extension::<Pivot>().unwrap();
    assert_eq!(pivot.get("role"), json!("primary"));
    assert_eq!(pivot.get("post_id"), post.key().unwrap());

    let changes = tags.sync(&[go.key().unwrap()]).await.unwrap();
    assert_eq!(changes.attached, vec![go.key().unwrap()]);
    assert_eq!(changes.detached, vec![rust.key().unwrap()]);
    let names: Vec<Value> = tags.get_results(None).await.unwrap().iter().map(|t| t.get("name")).collect();
    assert_eq!(names, vec![json!("go")]);
}

#[tokio::test]
async fn test_soft_delete_propagates_and_restores() {
    let storm = blog();
    let author = create(&storm, "Author", json!({"name": "a"})).await;
    let book = storm.relation(&author, "books").unwrap().create(row(json!({"title": "b"})), None).await.unwrap();

    assert!(storm.delete(&author).await.unwrap());
    assert!(author.is_trashed());
    assert!(storm.find("Author", author.key().unwrap()).await.unwrap().is_none());
    assert!(storm.find("Book", book.key().unwrap()).await.unwrap().is_none());
    let trashed = storm.find_with_trashed("Book", book.key().unwrap()).await.unwrap().unwrap();
    assert!(trashed.is_trashed());

    assert!(storm.restore(&author).await.unwrap());
    assert!(storm.find("Author", author.key().unwrap()).await.unwrap().is_some());
    assert!(storm.find("Book", book.key().unwrap()).await.unwrap().is_some());

    assert!(storm.force_delete(&author).await.unwrap());
    assert!(storm.find_with_trashed("Author", author.key().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_attachments_order_and_visibility() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let images = storm.relation(&post, "images").unwrap();

    let a = images.create(row(json!({"title": "a"})), None).await.unwrap();
    let b = images.create(row(json!({"title": "b"})), None).await.unwrap();
    assert_eq!(a.get(IS_PUBLIC), json!(true));
    assert_eq!(a.get("field"), json!("images"));
    assert_eq!(a.get("attachment_type"), json!("Post"));

    images
        .set_relation_order(&[b.key().unwrap(), a.key().unwrap()], None)
        .await
        .unwrap();
    let titles: Vec<Value> = images.get_results(None).await.unwrap().iter().map(|i| i.get("title")).collect();
    assert_eq!(titles, vec![json!("b"), json!("a")]);

    // keys of other relations' members are left alone
    let other = create(&storm, "Post", json!({"title": "other"})).await;
    let foreign = storm
        .relation(&other, "images")
        .unwrap()
        .create(row(json!({"title": "c", "sort_order": 7})), None)
        .await
        .unwrap();
    images
        .set_relation_order(&[foreign.key().unwrap(), a.key().unwrap()], None)
        .await
        .unwrap();
    let stored = storm.find("Image", foreign.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.get("sort_order"), json!(7));

    let err = images
        .set_relation_order(&[a.key().unwrap()], Some(&[1, 2][..]))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_attach_one_replaces_previous() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let cover = storm.relation(&post, "cover").unwrap();

    let first = cover.create(row(json!({"title": "first"})), None).await.unwrap();
    assert_eq!(first.get(IS_PUBLIC), json!(false));
    let second = cover.create(row(json!({"title": "second"})), None).await.unwrap();

    assert!(storm.find("Image", first.key().unwrap()).await.unwrap().is_none());
    let current = cover.first(None).await.unwrap().unwrap();
    assert!(current.is(&second));

    // both relations share the images table but not their members
    assert!(storm.relation(&post, "images").unwrap().get_results(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_morph_to_resolves_owner() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "owner"})).await;
    let image = storm.relation(&post, "images").unwrap().create(row(json!({})), None).await.unwrap();

    let owner = storm.relation(&image, "attachment").unwrap();
    let found = owner.first(None).await.unwrap().unwrap();
    assert!(found.is(&post));
    assert_eq!(
        owner.get_simple_value(None).await.unwrap(),
        json!([post.key().unwrap(), "Post"])
    );
}

#[tokio::test]
async fn test_count_only() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    for body in ["a", "b"] {
        storm.relation(&post, "comments").unwrap().create(row(json!({"body": body})), None).await.unwrap();
    }

    let counted = storm.relation(&post, "comment_count").unwrap();
    assert_eq!(counted.count(None).await.unwrap(), 2);
    let results = counted.get_results(None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].get("count"), json!(2));
    assert_eq!(results[0].get("post_id"), post.key().unwrap());
}

#[tokio::test]
async fn test_before_event_vetoes_add() {
    let storm = blog();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    storm.listen_fn("Post", move |event: &RelationEvent| {
        seen.fetch_add(1, Ordering::SeqCst);
        if event.kind == RelationEventKind::BeforeAdd {
            EventOutcome::Halt
        } else {
            EventOutcome::Continue
        }
    });

    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let comment = create(&storm, "Comment", json!({"body": "blocked"})).await;
    storm.relation(&post, "comments").unwrap().add(&comment, None, Row::new()).await.unwrap();

    assert!(comment.get("post_id").is_null());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_load_and_push() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    storm.relation(&post, "comments").unwrap().create(row(json!({"body": "old"})), None).await.unwrap();

    let loaded = storm.relation(&post, "comments").unwrap().load().await.unwrap();
    let Loaded::Many(comments) = loaded else {
        panic!("comments load as a collection");
    };
    comments[0].set("body", "edited");
    post.set("title", "pushed");

    storm.push(&post, None).await.unwrap();

    let stored = storm.find("Comment", comments[0].key().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.get("body"), json!("edited"));
    let stored = storm.find("Post", post.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.get("title"), json!("pushed"));
}

#[tokio::test]
async fn test_relation_to_wrong_model_is_rejected() {
    let storm = blog();
    let post = create(&storm, "Post", json!({"title": "p"})).await;
    let user = create(&storm, "User", json!({"name": "u"})).await;

    let err = storm.relation(&post, "comments").unwrap().add(&user, None, Row::new()).await.unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument(_)));
    assert!(matches!(storm.relation(&post, "missing"), Err(ModelError::Relationship(_))));
}
