//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ServerHost;
use crate::config::Settings;
use crate::core::auth::{AuthProvider, BearerAuthProvider, NoAuthProvider};
use crate::core::store::{CollectionRef, DocumentStore};
use crate::resources::{MethodHandler, MethodRegistry};
use anyhow::{Result, anyhow};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers from a settings document
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config_file("docrest.yaml")?
///     .with_store(InMemoryDocumentStore::new())
///     .with_method_handler("publish", PublishPost)
///     .build()?;
/// ```
pub struct ServerBuilder {
    settings: Option<Settings>,
    store: Option<Arc<dyn DocumentStore>>,
    methods: MethodRegistry,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            settings: None,
            store: None,
            methods: MethodRegistry::new(),
            auth_provider: None,
            custom_routes: Vec::new(),
        }
    }

    /// Use already loaded settings (required unless a config file is given)
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Load and validate settings from a YAML file
    pub fn with_config_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let settings = Settings::from_yaml_file(path)?;
        Ok(self.with_settings(settings))
    }

    /// Set the document store (required)
    pub fn with_store(self, store: impl DocumentStore + 'static) -> Self {
        self.with_shared_store(Arc::new(store))
    }

    /// Set a document store that is shared with other parts of the application
    pub fn with_shared_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Connect to MongoDB using the settings' `connection` block
    ///
    /// Settings must be set first.
    #[cfg(feature = "mongodb_backend")]
    pub async fn with_mongodb(self) -> Result<Self> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| anyhow!("Settings are required before connecting. Call .with_settings()"))?;
        let store = crate::storage::MongoDocumentStore::connect(&settings.connection).await?;
        Ok(self.with_store(store))
    }

    /// Register the handler behind a declared method
    ///
    /// `name` is the `handler` value used in `methods` / `item_methods`.
    pub fn with_method_handler(mut self, name: &str, handler: impl MethodHandler + 'static) -> Self {
        self.methods.register(name, Arc::new(handler));
        self
    }

    /// Replace the default bearer-token authorization
    pub fn with_auth_provider(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth_provider = Some(Arc::new(provider));
        self
    }

    /// Add custom routes to the server
    ///
    /// Custom routes are merged next to the resource routes and are not
    /// subject to resource authorization. A custom path must not collide
    /// with a configured resource slug.
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    ///
    /// Without an explicit provider, requests are authorized against the
    /// token collection named in `auth`, unless `auth.enabled` is false.
    pub fn build_host(mut self) -> Result<ServerHost> {
        let settings = self
            .settings
            .take()
            .ok_or_else(|| anyhow!("Settings are required. Call .with_settings()"))?;
        let store = self
            .store
            .take()
            .ok_or_else(|| anyhow!("A DocumentStore is required. Call .with_store()"))?;

        let auth: Arc<dyn AuthProvider> = match self.auth_provider.take() {
            Some(provider) => provider,
            None if settings.auth.enabled => Arc::new(BearerAuthProvider::new(
                store.clone(),
                CollectionRef::new(settings.auth.db.clone(), settings.auth.collection.clone()),
            )),
            None => {
                tracing::warn!("authorization is disabled");
                Arc::new(NoAuthProvider)
            }
        };

        let host = ServerHost::from_builder_components(settings, store, self.methods, auth)?;
        tracing::info!(resources = ?host.resource_names(), "host built");
        Ok(host)
    }

    /// Build the final REST router
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        RestExposure::build_router(host, custom_routes)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{MethodContext, handler_fn};
    use crate::storage::InMemoryDocumentStore;
    use serde_json::{Value, json};

    const SETTINGS: &str = r#"
resources:
  posts:
    type: list
    db: blog
    collection: posts
    schema:
      title: {type: string, required: true}
    item_methods:
      publish: {type: operation, handler: publish}
"#;

    fn settings() -> Settings {
        Settings::from_yaml_str(SETTINGS).unwrap()
    }

    async fn publish(_ctx: MethodContext) -> Result<Value> {
        Ok(json!({"published": true}))
    }

    // ── Constructor tests ────────────────────────────────────────────────

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = ServerBuilder::new();
        assert!(builder.settings.is_none());
        assert!(builder.store.is_none());
        assert!(builder.methods.is_empty());
        assert!(builder.custom_routes.is_empty());
    }

    // ── build_host ───────────────────────────────────────────────────────

    #[test]
    fn test_build_host_without_settings_fails() {
        let err = ServerBuilder::new()
            .with_store(InMemoryDocumentStore::new())
            .build_host()
            .err()
            .unwrap();
        assert!(err.to_string().contains("Settings are required"));
    }

    #[test]
    fn test_build_host_without_store_fails() {
        let err = ServerBuilder::new()
            .with_settings(settings())
            .build_host()
            .err()
            .unwrap();
        assert!(err.to_string().contains("DocumentStore is required"));
    }

    #[test]
    fn test_build_host_requires_declared_handlers() {
        let err = ServerBuilder::new()
            .with_settings(settings())
            .with_store(InMemoryDocumentStore::new())
            .build_host()
            .err()
            .unwrap();
        assert!(err.to_string().contains("publish"), "got: {err}");
    }

    #[test]
    fn test_build_host_with_handler() {
        let host = ServerBuilder::new()
            .with_settings(settings())
            .with_store(InMemoryDocumentStore::new())
            .with_method_handler("publish", handler_fn(publish))
            .build_host()
            .unwrap();
        assert_eq!(host.resource_names(), vec!["posts"]);
    }

    #[test]
    fn test_with_config_file_reports_missing_file() {
        let err = ServerBuilder::new()
            .with_config_file("/nonexistent/docrest.yaml")
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
    }

    // ── build (REST router) ──────────────────────────────────────────────

    #[test]
    fn test_build_with_custom_routes() {
        use axum::routing::get;

        let custom = Router::new().route("/custom/ping", get(|| async { "ok" }));
        let router = ServerBuilder::new()
            .with_settings(settings())
            .with_store(InMemoryDocumentStore::new())
            .with_method_handler("publish", handler_fn(publish))
            .with_auth_provider(NoAuthProvider)
            .with_custom_routes(custom)
            .build();
        assert!(router.is_ok());
    }
}
