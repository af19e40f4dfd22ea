//! Bearer token authorization over HTTP

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use axum::Router;
use axum::routing::get;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use docrest::core::json::date_value;
use docrest::prelude::*;
use std::sync::Arc;

const SETTINGS: &str = r#"
auth:
  db: tokens
  collection: bearer
resources:
  notes:
    type: list
    db: app
    collection: notes
    verbs: [list, read]
"#;

fn tokens() -> CollectionRef {
    CollectionRef::new("tokens", "bearer")
}

async fn create_test_server() -> (TestServer, Arc<InMemoryDocumentStore>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let custom = Router::new().route("/open", get(|| async { "open" }));
    let app = ServerBuilder::new()
        .with_settings(Settings::from_yaml_str(SETTINGS).expect("valid settings"))
        .with_shared_store(store.clone())
        .with_custom_routes(custom)
        .build()
        .expect("Failed to build app");
    (TestServer::new(app).expect("Failed to create test server"), store)
}

fn bearer(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap()
}

fn error_code(response: &axum_test::TestResponse) -> String {
    let body: Value = response.json();
    body["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_missing_header_is_unauthorized() {
    let (server, _) = create_test_server().await;
    let response = server.get("/notes").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&response), "authorization:missing-header");
}

#[tokio::test]
async fn test_bad_scheme_is_a_bad_request() {
    let (server, _) = create_test_server().await;
    let response = server
        .get("/notes")
        .add_header(AUTHORIZATION, bearer("Basic dXNlcjpwYXNz"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "authorization:bad-scheme");
}

#[tokio::test]
async fn test_malformed_header_is_a_syntax_error() {
    let (server, _) = create_test_server().await;
    let response = server
        .get("/notes")
        .add_header(AUTHORIZATION, bearer("Bearer one two"))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), "authorization:syntax-error");
}

#[tokio::test]
async fn test_unknown_and_expired_tokens() {
    let (server, store) = create_test_server().await;
    let past = Utc::now() - Duration::minutes(5);
    let expired = store
        .insert_one(&tokens(), json!({"valid_until": date_value(&past)}))
        .await
        .unwrap();

    for token in [expired.to_hex(), bson::oid::ObjectId::new().to_hex()] {
        let response = server
            .get("/notes")
            .add_header(AUTHORIZATION, bearer(&format!("Bearer {}", token)))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&response), "authorization:not-found");
    }
}

#[tokio::test]
async fn test_valid_token_reaches_the_resource() {
    let (server, store) = create_test_server().await;
    let future = Utc::now() + Duration::hours(1);
    let forever = store.insert_one(&tokens(), json!({"user": "ann"})).await.unwrap();
    let timed = store
        .insert_one(&tokens(), json!({"valid_until": date_value(&future)}))
        .await
        .unwrap();

    for token in [forever, timed] {
        let response = server
            .get("/notes")
            .add_header(AUTHORIZATION, bearer(&format!("bearer {}", token.to_hex())))
            .await;
        response.assert_status_ok();
        let body: Vec<Value> = response.json();
        assert!(body.is_empty());
    }
}

#[tokio::test]
async fn test_health_and_custom_routes_are_open() {
    let (server, _) = create_test_server().await;
    server.get("/health").await.assert_status_ok();
    let response = server.get("/open").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "open");
}
