//! Server host for transport-agnostic API exposure
//!
//! `ServerHost` holds everything a request needs: the validated settings,
//! the document store, the registered method handlers, the auth provider and
//! the compiled-schema cache. It is built once at startup and shared behind
//! an `Arc`; nothing in it changes afterwards.

use crate::config::Settings;
use crate::core::auth::AuthProvider;
use crate::core::error::ConfigError;
use crate::core::schema::SchemaCache;
use crate::core::store::DocumentStore;
use crate::resources::{AppState, Dispatcher, MethodRegistry};
use std::sync::Arc;

/// Host context containing all framework state
///
/// # Example
///
/// ```rust,ignore
/// let host = ServerHost::from_builder_components(settings, store, methods, auth)?;
/// let app = RestExposure::build_router(Arc::new(host), vec![])?;
/// ```
pub struct ServerHost {
    pub settings: Arc<Settings>,

    pub store: Arc<dyn DocumentStore>,

    /// Decides who is calling; applied to every resource route
    pub auth: Arc<dyn AuthProvider>,

    /// Compiled document schemas, keyed by schema instance
    pub schema_cache: Arc<SchemaCache>,

    pub dispatcher: Arc<Dispatcher>,
}

impl ServerHost {
    /// Build the host from builder components
    ///
    /// Fails when a declared method has no registered handler or a schema
    /// does not compile. Every resource schema is compiled here, so the
    /// cache is warm before the first request.
    pub fn from_builder_components(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        methods: MethodRegistry,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, ConfigError> {
        methods.check(settings.resources.values())?;

        let schema_cache = Arc::new(SchemaCache::new());
        settings.check_schemas(&schema_cache)?;

        let dispatcher = Arc::new(Dispatcher::new(
            &settings,
            store.clone(),
            methods,
            schema_cache.clone(),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            store,
            auth,
            schema_cache,
            dispatcher,
        })
    }

    /// Configured resource slugs, in declaration order
    pub fn resource_names(&self) -> Vec<&str> {
        self.settings.resources.keys().map(String::as_str).collect()
    }

    /// State handed to the resource handlers
    pub fn app_state(&self) -> AppState {
        AppState {
            dispatcher: self.dispatcher.clone(),
            auth: self.auth.clone(),
        }
    }
}
