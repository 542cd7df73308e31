//! Integration tests for the indigo-store crate.
//!
//! These tests go through the public surface only: a backend is opened from
//! configuration with `open_storage` and driven through `Arc<dyn Storage>`,
//! the way the platform's services use it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use indigo_store::{
    CompareOp, Entity, OpContext, QueryBuilder, QueryNode, Storage, StorageConfig, StoreError,
    and, condition, open_storage, or,
};

fn entity(v: Value) -> Entity {
    match v {
        Value::Object(map) => map,
        _ => panic!("test entity must be an object"),
    }
}

async fn open(dir: &tempfile::TempDir) -> Arc<dyn Storage> {
    open_storage(&StorageConfig::file(dir.path())).await.unwrap()
}

async fn seed(storage: &dyn Storage, ctx: &OpContext) {
    let people = [
        json!({"name": "erin", "age": 17, "city": "Oslo", "tags": ["new"]}),
        json!({"name": "zoe", "age": 34, "city": "Lima", "tags": ["vip", "old"]}),
        json!({"name": "kim", "age": 52, "city": "Oslo", "tags": []}),
        json!({"name": "ada", "age": 34, "city": "Pune", "tags": ["vip"]}),
    ];
    for person in people {
        storage.create(ctx, "people", entity(person)).await.unwrap();
    }
}

fn names(docs: &[Entity]) -> Vec<String> {
    let mut names: Vec<String> = docs
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn open_from_toml_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("default.toml");
    let data = dir.path().join("data");
    std::fs::write(
        &config_path,
        format!(
            "[storage]\ntype = \"file\"\n\n[storage.file]\npath = {:?}\nscan_workers = 2\n",
            data.display().to_string()
        ),
    )
    .unwrap();

    let config = StorageConfig::load(&config_path).unwrap();
    let storage = open_storage(&config).await.unwrap();
    let ctx = OpContext::background();
    storage
        .create(&ctx, "notes", entity(json!({"text": "hi"})))
        .await
        .unwrap();

    assert!(data.join("notes").is_dir());
}

#[tokio::test]
async fn open_rejects_incomplete_config() {
    let config = StorageConfig::from_toml_str("type = \"mongo\"").unwrap();
    let err = open_storage(&config).await.err().unwrap();
    assert!(matches!(err, StoreError::Config(_)), "{err}");
}

// ═══════════════════════════════════════════════════════════════════════
//  Queries through the trait object
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn builder_queries_select_the_expected_documents() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir).await;
    let ctx = OpContext::background();
    seed(storage.as_ref(), &ctx).await;

    let cases: Vec<(QueryNode, Vec<&str>)> = vec![
        (condition("city", CompareOp::Eq, "Oslo"), vec!["erin", "kim"]),
        (condition("age", CompareOp::Gt, 34), vec!["kim"]),
        (condition("age", CompareOp::Ge, 34), vec!["ada", "kim", "zoe"]),
        (condition("age", CompareOp::Ne, 34), vec!["erin", "kim"]),
        (condition("name", CompareOp::Lt, "f"), vec!["ada", "erin"]),
        (condition("tags", CompareOp::Eq, "vip"), vec!["ada", "zoe"]),
        (
            and(
                condition("city", CompareOp::Eq, "Oslo"),
                condition("age", CompareOp::Ge, 18),
            ),
            vec!["kim"],
        ),
        (
            or(
                condition("city", CompareOp::Eq, "Pune"),
                condition("age", CompareOp::Le, 17),
            ),
            vec!["ada", "erin"],
        ),
        (
            QueryBuilder::any_of([
                condition("name", CompareOp::Eq, "zoe"),
                condition("name", CompareOp::Eq, "kim"),
                condition("name", CompareOp::Eq, "nobody"),
            ])
            .unwrap(),
            vec!["kim", "zoe"],
        ),
    ];

    for (query, expected) in cases {
        let found = storage.get(&ctx, "people", 0, Some(&query)).await.unwrap();
        assert_eq!(names(&found), expected, "query: {query}");
    }
}

#[tokio::test]
async fn queries_deserialized_from_json_run_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir).await;
    let ctx = OpContext::background();
    seed(storage.as_ref(), &ctx).await;

    let query: QueryNode = serde_json::from_value(json!({
        "kind": "binary_op",
        "op": "AND",
        "left": {"kind": "condition", "field": "tags", "op": "=", "value": "vip"},
        "right": {"kind": "condition", "field": "age", "op": "<", "value": 40}
    }))
    .unwrap();

    let found = storage.get(&ctx, "people", 0, Some(&query)).await.unwrap();
    assert_eq!(names(&found), vec!["ada", "zoe"]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Full lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn entity_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir).await;
    let ctx = OpContext::with_timeout(Duration::from_secs(10));
    seed(storage.as_ref(), &ctx).await;

    // Bulk update via query.
    let vip = condition("tags", CompareOp::Eq, "vip");
    let updated = storage
        .update(&ctx, "people", Some(&vip), entity(json!({"tier": "gold"})))
        .await
        .unwrap();
    assert_eq!(updated, 2);

    // Single lookup and patch.
    let erin = storage
        .get_one(&ctx, "people", Some(&condition("name", CompareOp::Eq, "erin")))
        .await
        .unwrap();
    let erin_id = erin["_id"].as_str().unwrap().to_string();
    storage
        .update_by_id(&ctx, "people", &erin_id, entity(json!({"age": 18})))
        .await
        .unwrap();
    let erin = storage.get_by_id(&ctx, "people", &erin_id).await.unwrap();
    assert_eq!(erin["age"], json!(18));
    assert_eq!(erin["city"], json!("Oslo"));

    // Ids line up with documents.
    let gold = condition("tier", CompareOp::Eq, "gold");
    let mut ids = storage.get_ids(&ctx, "people", 0, Some(&gold)).await.unwrap();
    let mut doc_ids: Vec<String> = storage
        .get(&ctx, "people", 0, Some(&gold))
        .await
        .unwrap()
        .iter()
        .map(|d| d["_id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    doc_ids.sort();
    assert_eq!(ids, doc_ids);

    // Bulk delete, then the collection holds the rest.
    let deleted = storage.delete(&ctx, "people", Some(&gold)).await.unwrap();
    assert_eq!(deleted, 2);
    let rest = storage.get(&ctx, "people", 0, None).await.unwrap();
    assert_eq!(names(&rest), vec!["erin", "kim"]);

    storage.delete_by_id(&ctx, "people", &erin_id).await.unwrap();
    let err = storage.get_by_id(&ctx, "people", &erin_id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn data_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = OpContext::background();

    let id = {
        let storage = open(&dir).await;
        storage
            .create(&ctx, "notes", entity(json!({"text": "persisted"})))
            .await
            .unwrap()
    };

    let storage = open(&dir).await;
    let doc = storage.get_by_id(&ctx, "notes", &id).await.unwrap();
    assert_eq!(doc["text"], json!("persisted"));
}

#[tokio::test]
async fn collections_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir).await;
    let ctx = OpContext::background();

    let id = storage
        .create(&ctx, "a", entity(json!({"x": 1})))
        .await
        .unwrap();
    assert!(storage.get_by_id(&ctx, "b", &id).await.unwrap_err().is_not_found());
    assert!(storage.get(&ctx, "b", 0, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_from_another_task_stops_a_scan() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open(&dir).await;
    let live = OpContext::background();
    seed(storage.as_ref(), &live).await;

    let ctx = OpContext::background();
    let canceller = ctx.clone();
    // Not awaited: the task runs once the scan first waits on the disk.
    let cancelling = tokio::spawn(async move { canceller.cancel() });
    assert!(ctx.err().is_none());

    let err = storage.get(&ctx, "people", 0, None).await.unwrap_err();
    assert!(err.is_cancelled());
    cancelling.await.unwrap();
    assert_eq!(storage.get(&live, "people", 0, None).await.unwrap().len(), 4);
}
