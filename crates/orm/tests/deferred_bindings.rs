mod common;

use chrono::{Duration, Utc};
use common::{blog, blog_on, create};
use serde_json::json;
use std::sync::Arc;
use storm_orm::{DeferredBinding, MemoryStore, ModelError, OrmConfig, Query, Row, Storm};

#[tokio::test]
async fn test_bind_is_applied_when_parent_is_saved() {
    let storm = blog();
    let session = Storm::new_session_key();
    let post = storm.new_record("Post").unwrap();
    post.set("title", "Draft");
    let comment = create(&storm, "Comment", json!({"body": "first"})).await;

    storm
        .relation(&post, "comments")
        .unwrap()
        .add(&comment, Some(&session), Row::new())
        .await
        .unwrap();
    assert!(comment.get("post_id").is_null());
    assert!(storm.ledger().has_bindings("Post", &session).await.unwrap());

    let pending = storm
        .relation(&post, "comments")
        .unwrap()
        .get_results(Some(&session))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert!(storm.relation(&post, "comments").unwrap().get_results(None).await.unwrap().is_empty());

    storm.save(&post, Some(&session)).await.unwrap();

    let comments = storm.relation(&post, "comments").unwrap().get_results(None).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].get("post_id"), post.key().unwrap());
    assert!(!storm.ledger().has_bindings("Post", &session).await.unwrap());
}

#[tokio::test]
async fn test_bind_then_unbind_is_a_no_op() {
    let storm = blog();
    let session = Storm::new_session_key();
    let post = storm.new_record("Post").unwrap();
    let comment = create(&storm, "Comment", json!({"body": "gone"})).await;

    let comments = storm.relation(&post, "comments").unwrap();
    comments.add(&comment, Some(&session), Row::new()).await.unwrap();
    comments.remove(&comment, Some(&session)).await.unwrap();
    assert!(comments.get_results(Some(&session)).await.unwrap().is_empty());

    storm.save(&post, Some(&session)).await.unwrap();

    assert!(storm.relation(&post, "comments").unwrap().get_results(None).await.unwrap().is_empty());
    assert!(!storm.ledger().has_bindings("Post", &session).await.unwrap());
}

#[tokio::test]
async fn test_unbind_unbind_bind_is_a_no_op() {
    let storm = blog();
    let session = Storm::new_session_key();
    let post = storm.new_record("Post").unwrap();
    let comment = create(&storm, "Comment", json!({"body": "flip-flop"})).await;

    let comments = storm.relation(&post, "comments").unwrap();
    comments.remove(&comment, Some(&session)).await.unwrap();
    comments.remove(&comment, Some(&session)).await.unwrap();
    comments.add(&comment, Some(&session), Row::new()).await.unwrap();
    assert_eq!(storm.ledger().bindings("Post", &session).await.unwrap().len(), 3);
    assert!(comments.get_results(Some(&session)).await.unwrap().is_empty());

    storm.save(&post, Some(&session)).await.unwrap();

    assert!(storm.relation(&post, "comments").unwrap().get_results(None).await.unwrap().is_empty());
    let stored = storm.find("Comment", comment.key().unwrap()).await.unwrap().unwrap();
    assert!(stored.get("post_id").is_null());
    assert!(!storm.ledger().has_bindings("Post", &session).await.unwrap());
}

#[tokio::test]
async fn test_commit_sees_bindings_written_by_another_context() {
    let store = Arc::new(MemoryStore::new());
    let config = || OrmConfig::builder().with_identity_cache(64).build_with_defaults().unwrap();
    let worker_a = blog_on(store.clone(), config());
    let worker_b = blog_on(store, config());

    let post = worker_a.new_record("Post").unwrap();
    assert!(!worker_a.ledger().has_bindings("Post", "s1").await.unwrap());

    let comment = create(&worker_b, "Comment", json!({"body": "from b"})).await;
    let draft = worker_b.new_record("Post").unwrap();
    worker_b
        .relation(&draft, "comments")
        .unwrap()
        .add(&comment, Some("s1"), Row::new())
        .await
        .unwrap();

    assert!(worker_a.ledger().has_bindings("Post", "s1").await.unwrap());
    worker_a.save(&post, Some("s1")).await.unwrap();

    let committed = worker_a.relation(&post, "comments").unwrap().get_results(None).await.unwrap();
    assert_eq!(committed.len(), 1);
    assert!(committed[0].is(&comment));
    assert!(!worker_b.ledger().has_bindings("Post", "s1").await.unwrap());
}

#[tokio::test]
async fn test_session_overlays_persisted_membership() {
    let storm = blog();
    let session = Storm::new_session_key();
    let post = create(&storm, "Post", json!({"title": "Live"})).await;
    let kept = create(&storm, "Comment", json!({"body": "kept"})).await;
    let fresh = create(&storm, "Comment", json!({"body": "fresh"})).await;

    let comments = storm.relation(&post, "comments").unwrap();
    comments.add(&kept, None, Row::new()).await.unwrap();
    comments.add(&fresh, Some(&session), Row::new()).await.unwrap();
    comments.remove(&kept, Some(&session)).await.unwrap();

    let deferred = comments.get_results(Some(&session)).await.unwrap();
    assert_eq!(deferred.len(), 1);
    assert!(deferred[0].is(&fresh));

    let persisted = comments.get_results(None).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0].is(&kept));

    storm.save(&post, Some(&session)).await.unwrap();
    let committed = storm.relation(&post, "comments").unwrap().get_results(None).await.unwrap();
    assert_eq!(committed.len(), 1);
    assert!(committed[0].is(&fresh));
    let orphan = storm.find("Comment", kept.key().unwrap()).await.unwrap().unwrap();
    assert!(orphan.get("post_id").is_null());
}

#[tokio::test]
async fn test_belongs_to_binding_commits_before_insert() {
    let storm = blog();
    let session = Storm::new_session_key();
    let user = create(&storm, "User", json!({"name": "ada"})).await;
    let post = storm.new_record("Post").unwrap();

    storm
        .relation(&post, "author")
        .unwrap()
        .add(&user, Some(&session), Row::new())
        .await
        .unwrap();
    assert!(post.get("author_id").is_null());

    storm.save(&post, Some(&session)).await.unwrap();

    assert_eq!(post.get("author_id"), user.key().unwrap());
    let stored = storm.find("Post", post.key().unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.get("author_id"), user.key().unwrap());
}

#[tokio::test]
async fn test_cancel_deletes_orphaned_dependents_only() {
    let storm = blog();
    let session = Storm::new_session_key();
    let post = storm.new_record("Post").unwrap();
    let note = create(&storm, "Note", json!({"text": "scratch"})).await;
    let comment = create(&storm, "Comment", json!({"body": "survives"})).await;

    storm.relation(&post, "notes").unwrap().add(&note, Some(&session), Row::new()).await.unwrap();
    storm
        .relation(&post, "comments")
        .unwrap()
        .add(&comment, Some(&session), Row::new())
        .await
        .unwrap();

    let cancelled = storm.ledger().cancel("Post", &session).await.unwrap();
    assert_eq!(cancelled, 2);
    assert!(storm.find("Note", note.key().unwrap()).await.unwrap().is_none());
    assert!(storm.find("Comment", comment.key().unwrap()).await.unwrap().is_some());
    assert!(!storm.ledger().has_bindings("Post", &session).await.unwrap());
}

#[tokio::test]
async fn test_unknown_relation_rows_are_left_in_place() {
    let storm = blog();
    let session = Storm::new_session_key();
    let comment = create(&storm, "Comment", json!({"body": "x"})).await;
    let stale = DeferredBinding::new("Post", "retired", "Comment", &comment.key_string().unwrap(), &session, true);
    let table = storm.config().get_deferred_table().clone();
    storm.insert(&table, "id", stale.to_row().unwrap()).await.unwrap();

    let post = storm.new_record("Post").unwrap();
    storm.save(&post, Some(&session)).await.unwrap();

    let left = storm.ledger().bindings("Post", &session).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].master_field, "retired");
}

#[tokio::test]
async fn test_missing_slave_is_skipped() {
    let storm = blog();
    let session = Storm::new_session_key();
    let post = storm.new_record("Post").unwrap();
    let comment = create(&storm, "Comment", json!({"body": "deleted later"})).await;

    storm
        .relation(&post, "comments")
        .unwrap()
        .add(&comment, Some(&session), Row::new())
        .await
        .unwrap();
    storm.delete(&comment).await.unwrap();

    storm.save(&post, Some(&session)).await.unwrap();
    assert!(post.exists());
    assert_eq!(storm.ledger().bindings("Post", &session).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clean_up_discards_old_rows() {
    let storm = blog();
    let table = storm.config().get_deferred_table().clone();
    let note = create(&storm, "Note", json!({"text": "abandoned"})).await;

    let mut old = DeferredBinding::new("Post", "notes", "Note", &note.key_string().unwrap(), "old-session", true);
    old.created_at = Utc::now() - Duration::days(10);
    storm.insert(&table, "id", old.to_row().unwrap()).await.unwrap();

    let recent = DeferredBinding::new("Post", "comments", "Comment", "99", "new-session", true);
    storm.insert(&table, "id", recent.to_row().unwrap()).await.unwrap();

    assert_eq!(storm.ledger().clean_up(None).await.unwrap(), 1);
    assert!(storm.find("Note", note.key().unwrap()).await.unwrap().is_none());
    assert_eq!(storm.select(&Query::table(&table)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unsaved_slave_cannot_be_deferred() {
    let storm = blog();
    let post = storm.new_record("Post").unwrap();
    let comment = storm.new_record("Comment").unwrap();

    let err = storm
        .relation(&post, "comments")
        .unwrap()
        .add(&comment, Some("session"), Row::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_morph_to_rejects_session() {
    let storm = blog();
    let image = create(&storm, "Image", json!({"title": "x"})).await;
    let post = create(&storm, "Post", json!({"title": "p"})).await;

    let err = storm
        .relation(&image, "attachment")
        .unwrap()
        .add(&post, Some("session"), Row::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument(_)));
}
