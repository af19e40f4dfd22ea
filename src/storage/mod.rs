//! Storage implementations for different backends

pub mod in_memory;
pub mod matcher;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;

pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "mongodb_backend")]
pub use mongodb::MongoDocumentStore;
