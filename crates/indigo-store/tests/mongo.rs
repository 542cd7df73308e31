//! Live MongoDB tests.
//!
//! Ignored by default. Run against a scratch server with:
//!
//! ```text
//! INDIGO_TEST_MONGO_URI=mongodb://localhost:27017 cargo test -p indigo-store -- --ignored
//! ```
//!
//! Each test works in its own freshly named collection of the `indigo_test`
//! database and drops it afterwards.

#![cfg(feature = "mongo")]

use std::collections::HashSet;

use serde_json::{Value, json};

use indigo_store::{
    CompareOp, Entity, MongoStorage, OpContext, Storage, StoreError, condition,
};

const DB: &str = "indigo_test";

async fn connect() -> MongoStorage {
    let uri = std::env::var("INDIGO_TEST_MONGO_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    MongoStorage::connect(&uri, DB).await.unwrap()
}

fn scratch(name: &str) -> String {
    format!("{name}_{}", uuid::Uuid::new_v4().simple())
}

async fn drop_collection(storage: &MongoStorage, name: &str) {
    storage
        .database()
        .collection::<mongodb::bson::Document>(name)
        .drop()
        .await
        .unwrap();
}

fn entity(v: Value) -> Entity {
    match v {
        Value::Object(map) => map,
        _ => panic!("test entity must be an object"),
    }
}

#[tokio::test]
#[ignore = "requires a MongoDB server, run manually with --ignored"]
async fn create_update_delete_walkthrough() {
    let storage = connect().await;
    let ctx = OpContext::background();
    let users = scratch("users");

    let id = storage
        .create(&ctx, &users, entity(json!({"name": "erin", "age": "17"})))
        .await
        .unwrap();
    assert_eq!(
        Value::Object(storage.get_by_id(&ctx, &users, &id).await.unwrap()),
        json!({"_id": id, "name": "erin", "age": "17"})
    );

    let erin = condition("name", CompareOp::Eq, "erin");
    let n = storage
        .update(&ctx, &users, Some(&erin), entity(json!({"age": "18"})))
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(
        storage.get_by_id(&ctx, &users, &id).await.unwrap()["age"],
        json!("18")
    );

    storage.delete_by_id(&ctx, &users, &id).await.unwrap();
    assert!(storage.get_by_id(&ctx, &users, &id).await.unwrap_err().is_not_found());

    drop_collection(&storage, &users).await;
}

#[tokio::test]
#[ignore = "requires a MongoDB server, run manually with --ignored"]
async fn result_shapes_match_the_file_backend() {
    let storage = connect().await;
    let ctx = OpContext::background();
    let coll = scratch("shapes");

    assert!(storage.get(&ctx, &coll, 0, None).await.unwrap().is_empty());
    assert!(storage.get_ids(&ctx, &coll, 0, None).await.unwrap().is_empty());
    assert!(storage.get_one(&ctx, &coll, None).await.unwrap_err().is_not_found());
    assert!(storage.delete(&ctx, &coll, None).await.unwrap_err().is_not_found());
    assert!(
        storage
            .update_by_id(&ctx, &coll, "ghost", entity(json!({"x": 1})))
            .await
            .unwrap_err()
            .is_not_found()
    );

    let id = storage
        .create(&ctx, &coll, entity(json!({"x": 1})))
        .await
        .unwrap();
    let err = storage
        .update_by_id(&ctx, &coll, &id, entity(json!({"x": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NothingModified { .. }), "{err}");

    drop_collection(&storage, &coll).await;
}

#[tokio::test]
#[ignore = "requires a MongoDB server, run manually with --ignored"]
async fn explicit_ids_are_kept_and_unique() {
    let storage = connect().await;
    let ctx = OpContext::background();
    let coll = scratch("explicit");

    let id = storage
        .create(&ctx, &coll, entity(json!({"_id": "erin", "x": 1})))
        .await
        .unwrap();
    assert_eq!(id, "erin");
    let err = storage
        .create(&ctx, &coll, entity(json!({"_id": "erin"})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }), "{err}");

    let ids = storage.get_ids(&ctx, &coll, 0, None).await.unwrap();
    assert_eq!(ids, vec!["erin".to_string()]);

    drop_collection(&storage, &coll).await;
}

#[tokio::test]
#[ignore = "requires a MongoDB server, run manually with --ignored"]
async fn queries_and_bulk_writes() {
    let storage = connect().await;
    let ctx = OpContext::background();
    let coll = scratch("bulk");

    let mut adults = HashSet::new();
    for age in [12, 18, 30, 45] {
        let id = storage
            .create(&ctx, &coll, entity(json!({"age": age, "tags": ["t"]})))
            .await
            .unwrap();
        if age >= 18 {
            adults.insert(id);
        }
    }

    let q = condition("age", CompareOp::Ge, 18);
    let ids: HashSet<String> = storage
        .get_ids(&ctx, &coll, 0, Some(&q))
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(ids, adults);
    assert_eq!(storage.get(&ctx, &coll, 2, Some(&q)).await.unwrap().len(), 2);

    let updated = storage
        .update(&ctx, &coll, Some(&q), entity(json!({"adult": true})))
        .await
        .unwrap();
    assert_eq!(updated, 3);

    let deleted = storage
        .delete(&ctx, &coll, Some(&condition("tags", CompareOp::Eq, "t")))
        .await
        .unwrap();
    assert_eq!(deleted, 4);

    drop_collection(&storage, &coll).await;
}

#[tokio::test]
#[ignore = "requires a MongoDB server, run manually with --ignored"]
async fn cancelled_context_is_reported() {
    let storage = connect().await;
    let ctx = OpContext::background();
    ctx.cancel();

    let err = storage.get(&ctx, "anything", 0, None).await.unwrap_err();
    assert!(err.is_cancelled());
}
