//! Core module containing fundamental traits and types for the framework

pub mod auth;
pub mod error;
pub mod json;
pub mod path;
pub mod projection;
pub mod resource;
pub mod schema;
pub mod store;
pub mod traversal;

pub use auth::{AuthContext, AuthProvider, BearerAuthProvider, NoAuthProvider, Token, TokenStore};
pub use error::{DocrestError, DocrestResult};
pub use path::{AccessStep, PartialTree, PartialType, PathPartial, Subscript, resolve_path};
pub use projection::{Projection, ProjectionError, apply_projection};
pub use resource::{MethodKind, ResourceDefinition, ResourceKind, Verb, VerbPolicy};
pub use store::{CollectionRef, DocumentStore, FindOptions, SortDirection, SortKey};
pub use traversal::{Traversed, WriteBack, traverse};
