//! Request dispatch
//!
//! [`Dispatcher`] turns an addressed request into store calls:
//! resolve the resource, check the verb, fetch with the resource's filter,
//! walk the sub-path, project, and for mutations validate the body before
//! writing. It knows nothing about HTTP beyond the [`Reply`] it returns, so
//! it can be driven directly from tests.

use crate::config::Settings;
use crate::core::auth::AuthContext;
use crate::core::error::{
    ConfigError, DocrestError, DocrestResult, FieldValidationError, ResourceError, ValidationError,
};
use crate::core::json::{encode_response, is_object_id_literal, oid_value, parse_object_id};
use crate::core::path::resolve_path;
use crate::core::resource::{
    DELETED_AT_FIELD, DELETED_FIELD, MethodKind, ResourceDefinition, ResourceKind, Verb,
};
use crate::core::schema::{CompiledSchema, Mode, SchemaCache, SchemaRegistry, validate};
use crate::core::store::{DocumentStore, FindOptions};
use crate::core::traversal::traverse;
use crate::resources::methods::{MethodContext, MethodRegistry};
use crate::resources::query::QueryParams;
use crate::resources::registry::ResourceRegistry;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bson::oid::ObjectId;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Fields a client never writes directly
const RESERVED_FIELDS: [&str; 3] = ["_id", DELETED_FIELD, DELETED_AT_FIELD];

/// What the part of the URL after the resource slug points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// The resource itself: the collection, or a simple resource's document
    Root,
    /// One item of a list resource, optionally a nested member of it
    Item { id: ObjectId, path: Vec<String> },
    /// A nested member of a simple resource's document
    Nested { path: Vec<String> },
    /// A `~slug` method, on the resource or on one item
    Method { item: Option<ObjectId>, slug: String },
}

impl Address {
    /// Parse the segments after the resource slug
    ///
    /// Returns `None` for anything that can never be served: empty segments,
    /// item ids that are not 24 lowercase hex digits, or a `~slug` anywhere
    /// but in last position.
    pub fn parse(kind: ResourceKind, rest: &str) -> Option<Self> {
        if rest.is_empty() {
            return Some(Address::Root);
        }
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        let (last, init) = segments.split_last()?;
        if let Some(slug) = last.strip_prefix('~') {
            if slug.is_empty() {
                return None;
            }
            let item = match (kind, init) {
                (_, []) => None,
                (ResourceKind::List, [id]) => Some(item_id(id)?),
                _ => return None,
            };
            return Some(Address::Method {
                item,
                slug: slug.to_string(),
            });
        }
        if segments.iter().any(|s| s.starts_with('~')) {
            return None;
        }

        let owned = |segments: &[&str]| segments.iter().map(|s| s.to_string()).collect();
        match kind {
            ResourceKind::List => Some(Address::Item {
                id: item_id(segments[0])?,
                path: owned(&segments[1..]),
            }),
            ResourceKind::Simple => Some(Address::Nested {
                path: owned(&segments),
            }),
        }
    }

    fn item(&self) -> Option<&ObjectId> {
        match self {
            Address::Item { id, .. } => Some(id),
            Address::Method { item, .. } => item.as_ref(),
            _ => None,
        }
    }

    fn path(&self) -> &[String] {
        match self {
            Address::Item { path, .. } | Address::Nested { path } => path,
            _ => &[],
        }
    }
}

fn item_id(segment: &str) -> Option<ObjectId> {
    if is_object_id_literal(segment) {
        parse_object_id(segment)
    } else {
        None
    }
}

/// A successful outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    pub fn created(id: &ObjectId) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: Some(json!({ "_id": oid_value(id) })),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(encode_response(body))).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Executes resource operations against a document store
pub struct Dispatcher {
    resources: ResourceRegistry,
    schemas: SchemaRegistry,
    cache: Arc<SchemaCache>,
    store: Arc<dyn DocumentStore>,
    methods: MethodRegistry,
    max_results: u64,
}

impl Dispatcher {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn DocumentStore>,
        methods: MethodRegistry,
        cache: Arc<SchemaCache>,
    ) -> Self {
        Self {
            resources: ResourceRegistry::new(settings.resources.clone()),
            schemas: settings.schemas.clone(),
            cache,
            store,
            methods,
            max_results: settings.max_results,
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// `GET /{resource}` on a list resource
    pub async fn list(&self, name: &str, query: &QueryParams) -> DocrestResult<Reply> {
        let resource = self.resources.resolve(name, Verb::List)?;
        let cursor = query.cursor(self.max_results, &resource.order_by)?;
        let projection = query.projection(resource.list_projection.as_ref())?;

        debug!(
            resource = name,
            offset = cursor.offset,
            limit = cursor.limit,
            "listing documents"
        );
        let documents = self
            .store
            .find(
                &resource.target,
                &resource.effective_filter(),
                FindOptions {
                    projection: projection.map(|p| p.to_store_value()),
                    sort: cursor.order_by,
                    skip: cursor.offset,
                    limit: Some(cursor.limit),
                },
            )
            .await?;

        Ok(Reply::ok(Value::Array(documents)))
    }

    /// `POST /{resource}`
    pub async fn create(&self, name: &str, body: Value) -> DocrestResult<Reply> {
        let resource = self.resources.resolve(name, Verb::Create)?;
        let mut document = self.check_body(resource, body, Mode::Full)?;
        resource.stamp(&mut document);

        if resource.kind == ResourceKind::Simple {
            let existing = self
                .store
                .find_one(&resource.target, &resource.effective_filter(), None)
                .await?;
            if existing.is_some() {
                debug!(resource = name, "simple resource already has a document");
                return Err(ResourceError::conflict(name).into());
            }
        }

        let id = self
            .store
            .insert_one(&resource.target, Value::Object(document))
            .await?;
        debug!(resource = name, id = %id.to_hex(), "document created");
        Ok(Reply::created(&id))
    }

    /// `GET` on a document or a nested member of it
    pub async fn read(&self, name: &str, address: &Address, query: &QueryParams) -> DocrestResult<Reply> {
        let resource = self.resources.resolve(name, Verb::Read)?;
        let steps = resolve_path(&resource.partials, address.path())
            .ok_or_else(|| ResourceError::not_found(name))?;
        let filter = self.filter_for(resource, address.item());

        if steps.is_empty() {
            let projection = query.projection(resource.item_projection.as_ref())?;
            let store_projection = projection.map(|p| p.to_store_value());
            let document = self
                .store
                .find_one(&resource.target, &filter, store_projection.as_ref())
                .await?
                .ok_or_else(|| ResourceError::not_found(name))?;
            return Ok(Reply::ok(document));
        }

        // nested members only follow an explicit projection
        let projection = query.projection(None)?;
        let root = self.fetch(resource, &filter).await?;
        let found = traverse(&resource.target, root, &steps, projection.as_ref())
            .ok_or_else(|| ResourceError::not_found(name))?;
        Ok(Reply::ok(found.value))
    }

    /// `PUT` on a document or a nested member of it
    pub async fn replace(&self, name: &str, address: &Address, body: Value) -> DocrestResult<Reply> {
        let resource = self.resources.resolve(name, Verb::Replace)?;
        let steps = resolve_path(&resource.partials, address.path())
            .ok_or_else(|| ResourceError::not_found(name))?;
        let filter = self.filter_for(resource, address.item());

        if steps.is_empty() {
            let mut document = self.check_body(resource, body, Mode::Full)?;
            resource.stamp(&mut document);
            let matched = self
                .store
                .replace_one(&resource.target, &filter, Value::Object(document))
                .await?;
            if matched == 0 {
                return Err(ResourceError::not_found(name).into());
            }
            debug!(resource = name, "document replaced");
            return Ok(Reply::no_content());
        }

        let root = self.fetch(resource, &filter).await?;
        let mut write_back = traverse(&resource.target, root, &steps, None)
            .and_then(|found| found.write_back)
            .ok_or_else(|| ResourceError::not_found(name))?;
        if !write_back.apply(body) {
            return Err(ResourceError::not_found(name).into());
        }
        if let Some(normalized) = self.revalidate(resource, write_back.root())? {
            *write_back.root_mut() = normalized;
        }
        if !write_back.persist(self.store.as_ref()).await? {
            return Err(ResourceError::not_found(name).into());
        }
        debug!(resource = name, depth = steps.len(), "nested member replaced");
        Ok(Reply::no_content())
    }

    /// `PATCH` on a document or a nested mapping
    ///
    /// At the top level the body is validated field by field and applied as
    /// `$set`. Below it the body is merged into the addressed mapping and the
    /// whole document is revalidated.
    pub async fn update(&self, name: &str, address: &Address, body: Value) -> DocrestResult<Reply> {
        let resource = self.resources.resolve(name, Verb::Update)?;
        let steps = resolve_path(&resource.partials, address.path())
            .ok_or_else(|| ResourceError::not_found(name))?;
        let filter = self.filter_for(resource, address.item());

        if steps.is_empty() {
            let mut fields = self.check_body(resource, body, Mode::Partial)?;
            if !fields.is_empty() {
                resource.stamp(&mut fields);
            }
            let matched = if fields.is_empty() {
                self.fetch(resource, &filter).await.map(|_| 1u64)?
            } else {
                self.store
                    .update_one(&resource.target, &filter, json!({ "$set": fields }))
                    .await?
            };
            if matched == 0 {
                return Err(ResourceError::not_found(name).into());
            }
            debug!(resource = name, "document patched");
            return Ok(Reply::no_content());
        }

        let Value::Object(patch) = body else {
            return Err(expected_object().into());
        };
        let root = self.fetch(resource, &filter).await?;
        let mut write_back = traverse(&resource.target, root, &steps, None)
            .and_then(|found| found.write_back)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let Some(Value::Object(mut merged)) = write_back.current().cloned() else {
            return Err(ValidationError::InvalidJson {
                message: "only a mapping can be patched".to_string(),
            }
            .into());
        };
        merged.extend(patch);
        if !write_back.apply(Value::Object(merged)) {
            return Err(ResourceError::not_found(name).into());
        }
        if let Some(normalized) = self.revalidate(resource, write_back.root())? {
            *write_back.root_mut() = normalized;
        }
        if !write_back.persist(self.store.as_ref()).await? {
            return Err(ResourceError::not_found(name).into());
        }
        debug!(resource = name, depth = steps.len(), "nested mapping patched");
        Ok(Reply::no_content())
    }

    /// `DELETE` on a document; soft-deleting resources only mark it
    pub async fn delete(&self, name: &str, address: &Address) -> DocrestResult<Reply> {
        let resource = self.resources.resolve(name, Verb::Delete)?;
        if !address.path().is_empty() {
            return Err(ResourceError::not_found(name).into());
        }
        let filter = self.filter_for(resource, address.item());

        let matched = if resource.soft_delete {
            self.store
                .update_one(&resource.target, &filter, resource.soft_delete_update(&Utc::now()))
                .await?
        } else {
            self.store.delete_one(&resource.target, &filter).await?
        };
        if matched == 0 {
            return Err(ResourceError::not_found(name).into());
        }
        debug!(resource = name, soft = resource.soft_delete, "document deleted");
        Ok(Reply::no_content())
    }

    /// Run a declared `~slug` method
    #[allow(clippy::too_many_arguments)]
    pub async fn call_method(
        &self,
        name: &str,
        item: Option<&ObjectId>,
        slug: &str,
        kind: MethodKind,
        body: Option<Value>,
        query: HashMap<String, String>,
        auth: AuthContext,
    ) -> DocrestResult<Reply> {
        let resource = self
            .resources
            .get(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let declaration = resource
            .method(slug, item.is_some())
            .filter(|declaration| declaration.kind == kind)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let handler = self.methods.get(&declaration.handler).ok_or_else(|| {
            ConfigError::MissingHandler {
                resource: name.to_string(),
                method: slug.to_string(),
                handler: declaration.handler.clone(),
            }
        })?;

        let document = match (item, resource.kind) {
            (Some(id), _) => Some(self.fetch(resource, &resource.item_filter(id)).await?),
            (None, ResourceKind::Simple) => {
                self.store
                    .find_one(&resource.target, &resource.effective_filter(), None)
                    .await?
            }
            (None, ResourceKind::List) => None,
        };

        debug!(resource = name, method = slug, handler = %declaration.handler, "calling method");
        let ctx = MethodContext {
            resource: resource.clone(),
            kind,
            item_id: item.copied(),
            document,
            body,
            query,
            auth,
            store: self.store.clone(),
        };
        let out = handler.call(ctx).await?;
        Ok(Reply::ok(out))
    }

    fn filter_for(&self, resource: &ResourceDefinition, item: Option<&ObjectId>) -> Value {
        match item {
            Some(id) => resource.item_filter(id),
            None => resource.effective_filter(),
        }
    }

    /// Fetch the unprojected document matching `filter`
    async fn fetch(&self, resource: &ResourceDefinition, filter: &Value) -> DocrestResult<Value> {
        self.store
            .find_one(&resource.target, filter, None)
            .await?
            .ok_or_else(|| ResourceError::not_found(resource.name.as_str()).into())
    }

    /// The compiled document schema, `None` when it declares no fields
    fn compiled(&self, resource: &ResourceDefinition) -> DocrestResult<Option<Arc<CompiledSchema>>> {
        let compiled = self
            .cache
            .get_or_compile(&resource.document_schema, &self.schemas)
            .map_err(|e| ConfigError::schema(resource.name.as_str(), e))?;
        Ok((!compiled.is_empty()).then_some(compiled))
    }

    /// Validate a request body and strip the fields clients never write
    fn check_body(
        &self,
        resource: &ResourceDefinition,
        body: Value,
        mode: Mode,
    ) -> DocrestResult<Map<String, Value>> {
        let Value::Object(mut body) = body else {
            return Err(expected_object().into());
        };
        for reserved in RESERVED_FIELDS {
            body.remove(reserved);
        }
        let body = Value::Object(body);
        let normalized = match self.compiled(resource)? {
            Some(schema) => validate(&schema, &body, mode).map_err(ValidationError::FieldErrors)?,
            None => body,
        };
        let Value::Object(fields) = normalized else {
            return Err(DocrestError::Internal("validation returned a non-mapping".to_string()));
        };

        let operators: Vec<FieldValidationError> = fields
            .keys()
            .filter(|key| key.starts_with('$'))
            .map(|key| FieldValidationError::new(key.as_str(), "unknown field"))
            .collect();
        if !operators.is_empty() {
            return Err(ValidationError::FieldErrors(operators).into());
        }
        Ok(fields)
    }

    /// Validate a whole root after a nested write
    ///
    /// `_id`, deletion markers and fields stamped from the static filter are
    /// set aside while validating and restored afterwards. Literal filter
    /// values are re-stamped, so a nested write cannot move the document out
    /// of the resource. Returns `None` when the resource has no schema.
    fn revalidate(&self, resource: &ResourceDefinition, root: &Value) -> DocrestResult<Option<Value>> {
        let Some(schema) = self.compiled(resource)? else {
            return Ok(None);
        };
        let mut content = root.as_object().cloned().unwrap_or_default();
        let mut normalized = Map::new();
        let stamped = resource.static_filter.keys().map(String::as_str);
        for reserved in RESERVED_FIELDS.into_iter().chain(stamped) {
            if let Some(value) = content.remove(reserved) {
                normalized.insert(reserved.to_string(), value);
            }
        }

        match validate(&schema, &Value::Object(content), Mode::Full) {
            Ok(Value::Object(fields)) => {
                normalized.extend(fields);
                resource.stamp(&mut normalized);
                Ok(Some(Value::Object(normalized)))
            }
            Ok(_) => Err(DocrestError::Internal("validation returned a non-mapping".to_string())),
            Err(errors) => Err(ValidationError::FieldErrors(errors).into()),
        }
    }
}

fn expected_object() -> ValidationError {
    ValidationError::InvalidJson {
        message: "expected a JSON object".to_string(),
    }
}
