//! Typed resource definitions
//!
//! A [`ResourceDefinition`] is built once from the normalized settings
//! document and never changes afterwards. It knows where its documents live,
//! which verbs it answers, how its payloads are projected and validated, and
//! which filter every operation on it must carry.

use crate::core::error::ConfigError;
use crate::core::json::{as_datetime, as_object_id, date_value, oid_value};
use crate::core::path::PartialTree;
use crate::core::projection::Projection;
use crate::core::schema::Schema;
use crate::core::store::{CollectionRef, SortKey, and_filters};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Marker set on soft-deleted documents
pub const DELETED_FIELD: &str = "_deleted";
/// Deletion timestamp set alongside [`DELETED_FIELD`]
pub const DELETED_AT_FIELD: &str = "_deleted_at";

/// Whether a resource is a collection of items or a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    List,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    List,
    Read,
    Replace,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::List => "list",
            Verb::Read => "read",
            Verb::Replace => "replace",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which verbs a resource answers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VerbPolicy {
    /// `"*"`: every verb legal for the resource kind
    #[default]
    All,
    Only(BTreeSet<Verb>),
}

impl VerbPolicy {
    pub fn allows(&self, kind: ResourceKind, verb: Verb) -> bool {
        if verb == Verb::List && kind != ResourceKind::List {
            return false;
        }
        match self {
            VerbPolicy::All => true,
            VerbPolicy::Only(verbs) => verbs.contains(&verb),
        }
    }
}

impl<'de> Deserialize<'de> for VerbPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Star(String),
            Verbs(Vec<Verb>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Star(s) if s == "*" => Ok(VerbPolicy::All),
            Raw::Star(s) => Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list of verbs, got {:?}",
                s
            ))),
            Raw::Verbs(verbs) => Ok(VerbPolicy::Only(verbs.into_iter().collect())),
        }
    }
}

/// View methods answer GET and must not mutate; operations answer POST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    View,
    Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDeclaration {
    #[serde(rename = "type")]
    pub kind: MethodKind,
    /// Name the handler was registered under
    pub handler: String,
}

/// Normalized settings shape of one resource
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    kind: ResourceKind,
    db: String,
    collection: String,
    #[serde(default)]
    filter: Map<String, Value>,
    #[serde(default)]
    projection: Option<Value>,
    #[serde(default)]
    order_by: Vec<String>,
    #[serde(default)]
    list_projection: Option<Value>,
    #[serde(default)]
    methods: IndexMap<String, MethodDeclaration>,
    #[serde(default)]
    item_methods: IndexMap<String, MethodDeclaration>,
    #[serde(default)]
    verbs: VerbPolicy,
    #[serde(default)]
    partials: PartialTree,
    #[serde(default)]
    schema: Value,
    #[serde(default)]
    soft_delete: bool,
}

#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    pub name: String,
    pub kind: ResourceKind,
    pub target: CollectionRef,
    pub static_filter: Map<String, Value>,
    pub verbs: VerbPolicy,
    pub document_schema: Arc<Schema>,
    pub item_projection: Option<Projection>,
    pub list_projection: Option<Projection>,
    pub order_by: Vec<SortKey>,
    pub soft_delete: bool,
    pub methods: IndexMap<String, MethodDeclaration>,
    pub item_methods: IndexMap<String, MethodDeclaration>,
    pub partials: PartialTree,
}

impl ResourceDefinition {
    /// Build a definition from its normalized settings entry
    pub fn from_value(name: &str, value: &Value) -> Result<Self, ConfigError> {
        let raw: RawResource =
            serde_json::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue {
                field: format!("resources.{}", name),
                value: value.to_string(),
                message: e.to_string(),
            })?;

        let projection = |field: &str, raw: &Option<Value>| -> Result<Option<Projection>, ConfigError> {
            match raw {
                Some(v) => Projection::from_value(v).map_err(|e| ConfigError::InvalidValue {
                    field: format!("resources.{}.{}", name, field),
                    value: v.to_string(),
                    message: e.to_string(),
                }),
                None => Ok(None),
            }
        };
        let item_projection = projection("projection", &raw.projection)?;
        let list_projection = projection("list_projection", &raw.list_projection)?;

        let order_by = raw
            .order_by
            .iter()
            .map(|spec| {
                SortKey::parse(spec).ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("resources.{}.order_by", name),
                    value: spec.clone(),
                    message: "expected a field name, optionally prefixed with '-'".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let document_schema = match &raw.schema {
            Value::Null => Schema::new(),
            schema => Schema::from_value(schema, &format!("resources.{}.schema", name))
                .map_err(|e| ConfigError::schema(name, e))?,
        };

        let definition = Self {
            name: name.to_string(),
            kind: raw.kind,
            target: CollectionRef::new(raw.db, raw.collection),
            static_filter: raw.filter,
            verbs: raw.verbs,
            document_schema: Arc::new(document_schema),
            item_projection,
            list_projection,
            order_by,
            soft_delete: raw.soft_delete,
            methods: raw.methods,
            item_methods: raw.item_methods,
            partials: raw.partials,
        };

        if definition.document_schema.is_empty()
            && (definition.allows(Verb::Create) || definition.allows(Verb::Replace))
        {
            return Err(ConfigError::InvalidValue {
                field: format!("resources.{}.schema", name),
                value: "{}".to_string(),
                message: "a schema is required when create or replace is allowed".to_string(),
            });
        }

        Ok(definition)
    }

    pub fn allows(&self, verb: Verb) -> bool {
        self.verbs.allows(self.kind, verb)
    }

    pub fn is_list(&self) -> bool {
        self.kind == ResourceKind::List
    }

    /// The filter every operation on this resource carries
    pub fn effective_filter(&self) -> Value {
        let deleted = if self.soft_delete {
            json!({ DELETED_FIELD: { "$ne": true } })
        } else {
            Value::Null
        };
        and_filters([Value::Object(self.static_filter.clone()), deleted])
    }

    /// [`effective_filter`](Self::effective_filter) narrowed to one item
    pub fn item_filter(&self, id: &ObjectId) -> Value {
        and_filters([self.effective_filter(), json!({ "_id": oid_value(id) })])
    }

    /// Copy the static filter's literal equalities into a new document so it
    /// can be found through this resource afterwards
    pub fn stamp(&self, document: &mut Map<String, Value>) {
        for (field, value) in &self.static_filter {
            if field.starts_with('$') || !is_literal(value) {
                continue;
            }
            document.insert(field.clone(), value.clone());
        }
    }

    /// The update that soft-deletes a document
    pub fn soft_delete_update(&self, at: &DateTime<Utc>) -> Value {
        json!({ "$set": { DELETED_FIELD: true, DELETED_AT_FIELD: date_value(at) } })
    }

    /// Look up a named method; item methods are only consulted for item paths
    pub fn method(&self, slug: &str, on_item: bool) -> Option<&MethodDeclaration> {
        if on_item {
            self.item_methods.get(slug)
        } else {
            self.methods.get(slug)
        }
    }

    /// Every `(slug, declaration)` pair, collection methods first
    pub fn declared_methods(&self) -> impl Iterator<Item = (&String, &MethodDeclaration)> {
        self.methods.iter().chain(self.item_methods.iter())
    }
}

/// A filter value is a literal unless it is an operator document
fn is_literal(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            as_object_id(value).is_some()
                || as_datetime(value).is_some()
                || !map.keys().any(|k| k.starts_with('$'))
        }
        _ => true,
    }
}
