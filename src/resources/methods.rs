//! Named resource methods
//!
//! A resource may declare extra endpoints under a `~slug` path segment.
//! The settings only name a handler; the code behind that name is a
//! [`MethodHandler`] registered on the server builder. Views answer `GET`
//! and must not mutate, operations answer `POST`.

use crate::core::auth::AuthContext;
use crate::core::error::ConfigError;
use crate::core::resource::{MethodKind, ResourceDefinition};
use crate::core::store::DocumentStore;
use anyhow::Result;
use async_trait::async_trait;
use bson::oid::ObjectId;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Everything a method handler gets to see
#[derive(Clone)]
pub struct MethodContext {
    pub resource: Arc<ResourceDefinition>,
    pub kind: MethodKind,
    /// The item the method was called on, for item methods
    pub item_id: Option<ObjectId>,
    /// The full stored item (or the simple resource's document), unprojected
    pub document: Option<Value>,
    /// Request body, operations only
    pub body: Option<Value>,
    pub query: HashMap<String, String>,
    pub auth: AuthContext,
    pub store: Arc<dyn DocumentStore>,
}

/// Code behind a declared method
///
/// The returned value is sent back as the JSON response body.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, ctx: MethodContext) -> Result<Value>;
}

/// Adapter so plain async closures can be registered as handlers
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(MethodContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, ctx: MethodContext) -> Result<Value> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a [`MethodHandler`]
///
/// ```rust,ignore
/// builder.with_method_handler("count", handler_fn(|ctx| async move {
///     let found = ctx.store.find(&ctx.resource.target, &ctx.resource.effective_filter(), Default::default()).await?;
///     Ok(json!({ "count": found.len() }))
/// }))
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(MethodContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    FnHandler(f)
}

/// Handlers by registered name
#[derive(Clone, Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MethodHandler>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fail on the first declared method whose handler was never registered
    pub fn check<'a, I>(&self, resources: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = &'a Arc<ResourceDefinition>>,
    {
        for resource in resources {
            for (slug, declaration) in resource.declared_methods() {
                if !self.handlers.contains_key(&declaration.handler) {
                    return Err(ConfigError::MissingHandler {
                        resource: resource.name.clone(),
                        method: slug.clone(),
                        handler: declaration.handler.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
