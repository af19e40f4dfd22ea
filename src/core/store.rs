//! Document store contract
//!
//! The framework never talks to a database directly. Everything goes through
//! [`DocumentStore`], which mirrors the handful of primitives a document
//! database client offers. Filters, projections and documents are
//! `serde_json::Value`s in MongoDB query syntax.

use anyhow::Result;
use async_trait::async_trait;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Names a collection inside a database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    pub database: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One sort criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    /// Parse `field` (ascending) or `-field` (descending)
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (field, direction) = match spec.strip_prefix('-') {
            Some(rest) => (rest, SortDirection::Descending),
            None => (spec, SortDirection::Ascending),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            direction,
        })
    }
}

/// Options for [`DocumentStore::find`]
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Store-level projection (`{field: 1}` / `{field: 0}`)
    pub projection: Option<Value>,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Primitives the framework needs from a document database
///
/// Implementations must be safe to share across request tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find documents matching `filter`
    async fn find(
        &self,
        target: &CollectionRef,
        filter: &Value,
        options: FindOptions,
    ) -> Result<Vec<Value>>;

    /// Find the first document matching `filter`
    async fn find_one(
        &self,
        target: &CollectionRef,
        filter: &Value,
        projection: Option<&Value>,
    ) -> Result<Option<Value>>;

    /// Insert a document, assigning an `_id` when it has none
    async fn insert_one(&self, target: &CollectionRef, document: Value) -> Result<ObjectId>;

    /// Replace the first document matching `filter`; returns the matched count
    async fn replace_one(&self, target: &CollectionRef, filter: &Value, document: Value)
    -> Result<u64>;

    /// Apply an update document (`$set`, `$unset`) to the first match; returns the matched count
    async fn update_one(&self, target: &CollectionRef, filter: &Value, update: Value)
    -> Result<u64>;

    /// Delete the first document matching `filter`; returns the deleted count
    async fn delete_one(&self, target: &CollectionRef, filter: &Value) -> Result<u64>;
}

/// AND together filter documents, dropping empty ones
///
/// A single non-empty part is returned as-is; several become `{"$and": [...]}`.
pub fn and_filters<I>(parts: I) -> Value
where
    I: IntoIterator<Item = Value>,
{
    let mut parts: Vec<Value> = parts
        .into_iter()
        .filter(|part| !matches!(part, Value::Object(map) if map.is_empty()) && !part.is_null())
        .collect();

    match parts.len() {
        0 => Value::Object(Map::new()),
        1 => parts.remove(0),
        _ => serde_json::json!({ "$and": parts }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(
            SortKey::parse("-created"),
            Some(SortKey {
                field: "created".to_string(),
                direction: SortDirection::Descending
            })
        );
        assert_eq!(
            SortKey::parse(" name ").map(|k| k.direction),
            Some(SortDirection::Ascending)
        );
        assert_eq!(SortKey::parse("-"), None);
        assert_eq!(SortKey::parse(""), None);
    }

    #[test]
    fn test_and_filters_drops_empty_parts() {
        assert_eq!(and_filters([json!({}), json!({})]), json!({}));
        assert_eq!(and_filters([json!({}), json!({"a": 1})]), json!({"a": 1}));
        assert_eq!(
            and_filters([json!({"a": 1}), json!({"b": 2})]),
            json!({"$and": [{"a": 1}, {"b": 2}]})
        );
    }

    #[test]
    fn test_collection_ref_display() {
        assert_eq!(CollectionRef::new("shop", "items").to_string(), "shop.items");
    }
}
