//! Simple example: a blog served from an in-memory store
//!
//! Run with `cargo run --example simple_api`, then for instance:
//!
//! ```sh
//! curl -X POST localhost:3000/posts -d '{"title": "Hello", "comments": [{"author": "bob", "body": "hi"}]}'
//! curl localhost:3000/posts
//! curl localhost:3000/posts/<id>/comments/0/body
//! curl -X POST localhost:3000/posts/<id>/~publish
//! ```

use docrest::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SETTINGS: &str = r#"
auth:
  enabled: false
max_results: 50
schemas:
  comment:
    author: {type: string, required: true}
    body: {type: string, required: true}
    replies: {type: list, default: [], schema: {type: dict, schema: comment}}
resources:
  posts:
    type: list
    db: blog
    collection: posts
    order_by: ["-created"]
    list_projection: [title, published, created]
    soft_delete: true
    schema:
      title: {type: string, required: true, minlength: 1}
      published: {type: boolean, default: false}
      created: {type: datetime}
      comments: {type: list, default: [], schema: {type: dict, schema: comment}}
    partials:
      comments:
        field_name: comments
        field_type: list
        children:
          body: {field_name: body, field_type: scalar}
          replies: {field_name: replies, field_type: list}
    item_methods:
      publish: {type: operation, handler: publish}
    methods:
      stats: {type: view, handler: stats}
  about:
    type: simple
    db: blog
    collection: pages
    filter: {page: about}
    verbs: [create, read, update]
    schema:
      text: {type: string}
"#;

async fn publish(ctx: MethodContext) -> Result<Value> {
    let Some(id) = ctx.item_id else {
        anyhow::bail!("publish needs an item");
    };
    let filter = ctx.resource.item_filter(&id);
    let patch = json!({ "$set": { "published": true } });
    let matched = ctx.store.update_one(&ctx.resource.target, &filter, patch).await?;
    Ok(json!({ "published": matched == 1 }))
}

async fn stats(ctx: MethodContext) -> Result<Value> {
    let posts = ctx
        .store
        .find(&ctx.resource.target, &ctx.resource.effective_filter(), FindOptions::default())
        .await?;
    let published = posts.iter().filter(|p| p["published"] == json!(true)).count();
    Ok(json!({ "posts": posts.len(), "published": published }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,docrest=debug".into()))
        .init();

    let settings = Settings::from_yaml_str(SETTINGS)?;
    let store = Arc::new(InMemoryDocumentStore::new());

    println!("🚀 docrest simple example");
    println!("📦 Resources: {:?}", settings.resources.keys().collect::<Vec<_>>());
    println!("\n🌐 Server running on http://127.0.0.1:3000");
    println!("    GET    /posts                          - List posts");
    println!("    POST   /posts                          - Create a post");
    println!("    GET    /posts/{{id}}                     - Read a post");
    println!("    GET    /posts/{{id}}/comments/{{n}}        - Read one comment");
    println!("    PATCH  /posts/{{id}}/comments/{{n}}        - Patch one comment");
    println!("    POST   /posts/{{id}}/~publish            - Publish a post");
    println!("    GET    /posts/~stats                   - Post counts");
    println!("    GET    /about                          - The about page");

    ServerBuilder::new()
        .with_settings(settings)
        .with_shared_store(store)
        .with_method_handler("publish", handler_fn(publish))
        .with_method_handler("stats", handler_fn(stats))
        .serve("127.0.0.1:3000")
        .await
}
