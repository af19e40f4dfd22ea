//! Integration tests for the MongoDB document store
//!
//! # Requirements
//!
//! - Docker must be running (testcontainers launches a MongoDB container)
//! - Feature flag `mongodb_backend` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features mongodb_backend --test mongodb_tests
//! ```
//!
//! # Test isolation
//!
//! All tests share a single MongoDB container (via `OnceLock`). Each test
//! works in its own database.

#![cfg(feature = "mongodb_backend")]

use axum::http::StatusCode;
use axum_test::TestServer;
use docrest::prelude::*;
use mongodb::Client;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

// ---------------------------------------------------------------------------
// Shared test environment (single container, fresh client per test)
// ---------------------------------------------------------------------------

/// Holds the testcontainer handle (keeps it alive) and the connection URL.
struct MongoTestEnv {
    _container: testcontainers::ContainerAsync<Mongo>,
    connection_url: String,
}

static TEST_ENV: OnceLock<MongoTestEnv> = OnceLock::new();

async fn init_mongo_env() -> &'static MongoTestEnv {
    if let Some(env) = TEST_ENV.get() {
        return env;
    }

    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container, is Docker running?");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    let url = format!("mongodb://{}:{}", host, port);

    let env = MongoTestEnv {
        _container: container,
        connection_url: url,
    };

    let _ = TEST_ENV.set(env);
    TEST_ENV.get().unwrap()
}

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A store and a database name no other test uses
async fn mongo_store() -> (MongoDocumentStore, String) {
    let env = init_mongo_env().await;
    let client = Client::with_uri_str(&env.connection_url)
        .await
        .expect("Failed to connect to MongoDB");
    let db_num = DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    (MongoDocumentStore::new(client), format!("docrest_test_{}", db_num))
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_insert_find_and_extended_json() {
    let (store, db) = mongo_store().await;
    let target = CollectionRef::new(db, "things");

    let id = store
        .insert_one(
            &target,
            json!({"n": 1, "at": {"$date": "2024-05-01T10:00:00Z"}, "tags": ["a", "b"]}),
        )
        .await
        .unwrap();

    let found = store
        .find_one(&target, &json!({"_id": {"$oid": id.to_hex()}}), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["_id"], json!({"$oid": id.to_hex()}));
    assert_eq!(found["n"], json!(1));
    assert!(found["at"].get("$date").is_some());
    assert_eq!(found["tags"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_find_with_sort_skip_limit_and_projection() {
    let (store, db) = mongo_store().await;
    let target = CollectionRef::new(db, "things");
    for n in [3, 1, 2, 5, 4] {
        store
            .insert_one(&target, json!({"n": n, "secret": "x"}))
            .await
            .unwrap();
    }

    let page = store
        .find(
            &target,
            &json!({"n": {"$gte": 2}}),
            FindOptions {
                projection: Some(json!({"secret": 0})),
                sort: vec![SortKey::parse("-n").unwrap()],
                skip: 1,
                limit: Some(2),
            },
        )
        .await
        .unwrap();

    let ns: Vec<i64> = page.iter().map(|d| d["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![4, 3]);
    assert!(page.iter().all(|d| d.get("secret").is_none()));
}

#[tokio::test]
async fn test_replace_update_delete_report_matches() {
    let (store, db) = mongo_store().await;
    let target = CollectionRef::new(db, "things");
    let id = store.insert_one(&target, json!({"n": 1})).await.unwrap();
    let by_id = json!({"_id": {"$oid": id.to_hex()}});

    assert_eq!(store.replace_one(&target, &by_id, json!({"n": 2})).await.unwrap(), 1);
    assert_eq!(
        store
            .update_one(&target, &by_id, json!({"$set": {"label": "x"}}))
            .await
            .unwrap(),
        1
    );
    let found = store.find_one(&target, &by_id, None).await.unwrap().unwrap();
    assert_eq!(found["n"], json!(2));
    assert_eq!(found["label"], json!("x"));

    assert_eq!(store.delete_one(&target, &by_id).await.unwrap(), 1);
    assert_eq!(store.delete_one(&target, &by_id).await.unwrap(), 0);
    assert_eq!(
        store
            .update_one(&target, &by_id, json!({"$set": {"n": 3}}))
            .await
            .unwrap(),
        0
    );
}

// ---------------------------------------------------------------------------
// REST surface on top of MongoDB
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rest_roundtrip_with_nested_write_and_soft_delete() {
    let (store, db) = mongo_store().await;
    let settings = Settings::from_yaml_str(&format!(
        r#"
auth: {{enabled: false}}
resources:
  posts:
    type: list
    db: {db}
    collection: posts
    order_by: [title]
    soft_delete: true
    schema:
      title: {{type: string, required: true}}
      comments:
        type: list
        schema: {{type: dict, schema: {{body: {{type: string}}}}}}
    partials:
      comments: {{field_name: comments, field_type: list}}
"#
    ))
    .unwrap();

    let app = ServerBuilder::new()
        .with_settings(settings)
        .with_store(store)
        .build()
        .unwrap();
    let server = TestServer::new(app).unwrap();

    let response = server
        .post("/posts")
        .json(&json!({"title": "a", "comments": [{"body": "one"}]}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let id = response.json::<Value>()["_id"].as_str().unwrap().to_string();

    server
        .put(&format!("/posts/{}/comments/0", id))
        .json(&json!({"body": "edited"}))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let post: Value = server.get(&format!("/posts/{}", id)).await.json();
    assert_eq!(post["_id"], json!(id));
    assert_eq!(post["comments"][0]["body"], json!("edited"));

    server
        .delete(&format!("/posts/{}", id))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server.get(&format!("/posts/{}", id)).await.assert_status_not_found();
    let listed: Vec<Value> = server.get("/posts").await.json();
    assert!(listed.is_empty());
}
