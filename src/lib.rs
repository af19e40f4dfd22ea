//! # docrest
//!
//! A declarative, schema-driven REST layer over document databases.
//!
//! A single settings document declares the resources to expose. Each
//! resource maps to one collection and says which verbs it answers, how its
//! documents are projected and validated, which static filter every
//! operation carries, and which nested members can be addressed from a URL.
//! The framework serves the HTTP surface; application code only registers
//! handlers for the named `~methods` it declares.
//!
//! ## Features
//!
//! - **List and simple resources**: collections of items, or a single document
//! - **Weak paths**: `GET/PUT/PATCH /posts/{id}/comments/3` reaches into a stored document
//! - **Recursive schemas**: named schema definitions may refer to themselves
//! - **Projections**: per resource defaults, overridable with `?projection=`
//! - **Soft delete**: deleted documents are marked and hidden instead of removed
//! - **Bearer tokens**: looked up in a token collection, with optional expiry
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docrest::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     ServerBuilder::new()
//!         .with_config_file("docrest.yaml")?
//!         .with_store(InMemoryDocumentStore::new())
//!         .serve("127.0.0.1:3000")
//!         .await
//! }
//! ```

pub mod config;
pub mod core;
pub mod resources;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthProvider, BearerAuthProvider, NoAuthProvider, Token, TokenStore},
        error::{
            AuthError, ConfigError, DocrestError, DocrestResult, FieldValidationError,
            RequestError, ResourceError, ValidationError,
        },
        json::encode_response,
        projection::Projection,
        resource::{MethodKind, ResourceDefinition, ResourceKind, Verb, VerbPolicy},
        schema::{Mode, Rules, Schema, SchemaRegistry},
        store::{CollectionRef, DocumentStore, FindOptions, SortKey},
    };

    // === Resources ===
    pub use crate::resources::{
        MethodContext, MethodHandler, MethodRegistry, QueryParams, ResourceRegistry, handler_fn,
    };

    // === Storage ===
    pub use crate::storage::InMemoryDocumentStore;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoDocumentStore;

    // === Config ===
    pub use crate::config::{AuthConfig, ConnectionConfig, Settings};

    // === Server ===
    pub use crate::server::{ServerBuilder, ServerHost};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
}
