//! Server module for building HTTP servers from settings
//!
//! [`ServerBuilder`] collects the settings, the document store, method
//! handlers and an optional auth provider, then produces a [`ServerHost`]
//! and the REST router that serves every configured resource.

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::ServerBuilder;
pub use exposure::RestExposure;
pub use host::ServerHost;
