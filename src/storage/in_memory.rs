//! In-memory implementation of DocumentStore for testing and development

use super::matcher::{apply_update, matches, sort_documents};
use crate::core::json::{as_object_id, oid_value};
use crate::core::projection::Projection;
use crate::core::store::{CollectionRef, DocumentStore, FindOptions};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bson::oid::ObjectId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory document store
///
/// Useful for testing and development. Collections are created on first
/// insert and keep insertion order. Uses RwLock for thread-safe access.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<CollectionRef, Vec<Value>>>>,
}

impl InMemoryDocumentStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of documents in a collection
    pub fn count(&self, target: &CollectionRef) -> usize {
        self.collections
            .read()
            .map(|c| c.get(target).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn project(document: Value, projection: Option<&Value>) -> Result<Value> {
    let Some(raw) = projection else {
        return Ok(document);
    };
    let projection = Projection::from_value(raw).map_err(|e| anyhow!("invalid projection: {}", e))?;
    match (document, projection) {
        (Value::Object(map), Some(projection)) => Ok(Value::Object(projection.apply_to_document(map))),
        (document, _) => Ok(document),
    }
}

/// Index of the first document matching `filter`
fn position(documents: &[Value], filter: &Value) -> Result<Option<usize>> {
    for (i, document) in documents.iter().enumerate() {
        if matches(document, filter)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(
        &self,
        target: &CollectionRef,
        filter: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let mut found = Vec::new();
        for document in collections.get(target).into_iter().flatten() {
            if matches(document, filter)? {
                found.push(document.clone());
            }
        }
        drop(collections);

        sort_documents(&mut found, &options.sort);

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| project(document, options.projection.as_ref()))
            .collect()
    }

    async fn find_one(
        &self,
        target: &CollectionRef,
        filter: &Value,
        projection: Option<&Value>,
    ) -> Result<Option<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let Some(documents) = collections.get(target) else {
            return Ok(None);
        };
        match position(documents, filter)? {
            Some(i) => project(documents[i].clone(), projection).map(Some),
            None => Ok(None),
        }
    }

    async fn insert_one(&self, target: &CollectionRef, document: Value) -> Result<ObjectId> {
        let Value::Object(mut map) = document else {
            bail!("only documents can be inserted into {}", target);
        };

        let id = match map.get("_id") {
            Some(raw) => as_object_id(raw).ok_or_else(|| anyhow!("_id must be an object id"))?,
            None => {
                let id = ObjectId::new();
                map.insert("_id".to_string(), oid_value(&id));
                id
            }
        };

        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let documents = collections.entry(target.clone()).or_default();

        if documents
            .iter()
            .any(|d| d.get("_id").and_then(as_object_id) == Some(id))
        {
            bail!("duplicate key: _id {} already exists in {}", id.to_hex(), target);
        }
        documents.push(Value::Object(map));
        Ok(id)
    }

    async fn replace_one(
        &self,
        target: &CollectionRef,
        filter: &Value,
        document: Value,
    ) -> Result<u64> {
        let Value::Object(mut replacement) = document else {
            bail!("a replacement must be a document");
        };

        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let Some(documents) = collections.get_mut(target) else {
            return Ok(0);
        };
        let Some(i) = position(documents, filter)? else {
            return Ok(0);
        };

        let existing_id = documents[i].get("_id").cloned();
        if let (Some(existing), Some(given)) = (&existing_id, replacement.get("_id")) {
            if as_object_id(existing) != as_object_id(given) {
                bail!("_id is immutable");
            }
        }
        if let Some(id) = existing_id {
            replacement.insert("_id".to_string(), id);
        }
        documents[i] = Value::Object(replacement);
        Ok(1)
    }

    async fn update_one(&self, target: &CollectionRef, filter: &Value, update: Value) -> Result<u64> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let Some(documents) = collections.get_mut(target) else {
            return Ok(0);
        };
        let Some(i) = position(documents, filter)? else {
            return Ok(0);
        };

        // apply to a copy so a failing update leaves the document untouched
        let mut updated = documents[i].clone();
        apply_update(&mut updated, &update)?;
        documents[i] = updated;
        Ok(1)
    }

    async fn delete_one(&self, target: &CollectionRef, filter: &Value) -> Result<u64> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let Some(documents) = collections.get_mut(target) else {
            return Ok(0);
        };
        match position(documents, filter)? {
            Some(i) => {
                documents.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
