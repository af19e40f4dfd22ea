//! MongoDB storage backend using the official MongoDB async driver.
//!
//! Provides a `DocumentStore` implementation backed by a `mongodb::Client`.
//! Every [`CollectionRef`] maps to `client.database(db).collection(coll)`.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! docrest-rs = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Serialization strategy
//!
//! Documents, filters and updates travel as MongoDB extended JSON inside
//! `serde_json::Value` and are parsed into BSON with `Bson::try_from`, so
//! `{"$oid": ...}` and `{"$date": ...}` become native ObjectIds and
//! datetimes. Results come back as relaxed extended JSON.

use crate::config::ConnectionConfig;
use crate::core::error::StorageError;
use crate::core::store::{CollectionRef, DocumentStore, FindOptions, SortDirection, SortKey};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::bson::{Bson, Document};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert an extended JSON value (expected to be an Object) into a BSON Document.
fn json_to_document(json: Value) -> Result<Document> {
    let bson_val = Bson::try_from(json).map_err(|e| anyhow!("Failed to convert JSON to BSON: {}", e))?;

    match bson_val {
        Bson::Document(d) => Ok(d),
        _ => Err(anyhow!("Expected BSON document, got non-object")),
    }
}

/// Convert a BSON Document back into relaxed extended JSON.
fn document_to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

const BACKEND: &str = "MongoDB";

fn query_error(action: String, err: mongodb::error::Error) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        message: format!("{}: {}", action, err),
    }
}

fn sort_document(keys: &[SortKey]) -> Document {
    let mut sort = Document::new();
    for key in keys {
        let direction = match key.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        sort.insert(key.field.clone(), direction);
    }
    sort
}

// ---------------------------------------------------------------------------
// MongoDocumentStore
// ---------------------------------------------------------------------------

/// Document store backed by MongoDB.
///
/// # Example
///
/// ```rust,ignore
/// use docrest::storage::MongoDocumentStore;
///
/// let store = MongoDocumentStore::connect(&settings.connection).await?;
/// ```
#[derive(Clone, Debug)]
pub struct MongoDocumentStore {
    client: Client,
}

impl MongoDocumentStore {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the settings' connection parameters.
    pub async fn connect(connection: &ConnectionConfig) -> Result<Self> {
        let client = Client::with_uri_str(connection.uri())
            .await
            .map_err(|e| StorageError::ConnectionError {
                backend: BACKEND.to_string(),
                message: format!("{}:{}: {}", connection.host, connection.port, e),
            })?;
        tracing::info!(host = %connection.host, port = connection.port, "connected to MongoDB");
        Ok(Self::new(client))
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, target: &CollectionRef) -> mongodb::Collection<Document> {
        self.client
            .database(&target.database)
            .collection(&target.collection)
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn find(&self, target: &CollectionRef, filter: &Value, options: FindOptions) -> Result<Vec<Value>> {
        let mut action = self
            .collection(target)
            .find(json_to_document(filter.clone())?)
            .skip(options.skip);
        if !options.sort.is_empty() {
            action = action.sort(sort_document(&options.sort));
        }
        if let Some(limit) = options.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(projection) = options.projection {
            action = action.projection(json_to_document(projection)?);
        }

        let cursor = action
            .await
            .map_err(|e| query_error(format!("Failed to query {}", target), e))?;
        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| query_error(format!("Failed to collect documents from {}", target), e))?;

        Ok(docs.into_iter().map(document_to_json).collect())
    }

    async fn find_one(
        &self,
        target: &CollectionRef,
        filter: &Value,
        projection: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut action = self.collection(target).find_one(json_to_document(filter.clone())?);
        if let Some(projection) = projection {
            action = action.projection(json_to_document(projection.clone())?);
        }
        let doc = action
            .await
            .map_err(|e| query_error(format!("Failed to get document from {}", target), e))?;
        Ok(doc.map(document_to_json))
    }

    async fn insert_one(&self, target: &CollectionRef, document: Value) -> Result<ObjectId> {
        let result = self
            .collection(target)
            .insert_one(json_to_document(document)?)
            .await
            .map_err(|e| query_error(format!("Failed to insert into {}", target), e))?;

        match result.inserted_id {
            Bson::ObjectId(id) => Ok(id),
            other => Err(anyhow!("Unexpected _id type after insert: {}", other)),
        }
    }

    async fn replace_one(&self, target: &CollectionRef, filter: &Value, document: Value) -> Result<u64> {
        let result = self
            .collection(target)
            .replace_one(json_to_document(filter.clone())?, json_to_document(document)?)
            .await
            .map_err(|e| query_error(format!("Failed to replace document in {}", target), e))?;
        Ok(result.matched_count)
    }

    async fn update_one(&self, target: &CollectionRef, filter: &Value, update: Value) -> Result<u64> {
        let result = self
            .collection(target)
            .update_one(json_to_document(filter.clone())?, json_to_document(update)?)
            .await
            .map_err(|e| query_error(format!("Failed to update document in {}", target), e))?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, target: &CollectionRef, filter: &Value) -> Result<u64> {
        let result = self
            .collection(target)
            .delete_one(json_to_document(filter.clone())?)
            .await
            .map_err(|e| query_error(format!("Failed to delete document from {}", target), e))?;
        Ok(result.deleted_count)
    }
}
