//! The settings grammar
//!
//! Settings are validated with the same rule language as user documents. The
//! grammar is strict: unknown keys are rejected at every level. `partial`
//! refers to itself through its `children`, which is why the definitions
//! live in a [`SchemaRegistry`] instead of being nested inline.

use super::{FieldType, Rules, Schema, SchemaRegistry};

/// Identifiers: resource names, slugs, handler names, db and collection names
pub const IDENTIFIER: &str = "[a-zA-Z][a-zA-Z0-9_-]+";

/// `order_by` entries; a leading `-` sorts descending
pub const ORDER_FIELD: &str = "-?[a-zA-Z_][a-zA-Z0-9_.-]*";

pub const SETTINGS: &str = "docrest.settings";
pub const RESOURCE: &str = "docrest.resource";
pub const METHOD: &str = "docrest.method";
pub const ITEM_METHOD: &str = "docrest.item-method";
pub const PARTIAL: &str = "docrest.partial";

const ALL_VERBS: [&str; 6] = ["create", "list", "read", "replace", "update", "delete"];
const SIMPLE_VERBS: [&str; 5] = ["create", "read", "replace", "update", "delete"];

fn identifier() -> Rules {
    Rules::of(FieldType::String).regex(IDENTIFIER)
}

fn list_or_dict() -> Rules {
    Rules::new().anyof(vec![Rules::of(FieldType::List), Rules::of(FieldType::Dict)])
}

fn keyed_by_identifier(values: &str) -> Rules {
    Rules::of(FieldType::Dict)
        .keysrules(identifier())
        .valuesrules(Rules::of(FieldType::Dict).schema_ref(values))
}

fn method() -> Schema {
    Schema::new()
        .field(
            "type",
            Rules::of(FieldType::String)
                .required()
                .allowed(["view", "operation"]),
        )
        .field("handler", identifier().required())
}

fn partial() -> Schema {
    Schema::new()
        .field(
            "field_type",
            Rules::of(FieldType::String)
                .required()
                .allowed(["scalar", "list", "dict"]),
        )
        .field("field_name", identifier().required())
        .field("children", keyed_by_identifier(PARTIAL).default_value(serde_json::json!({})))
}

fn resource() -> Schema {
    Schema::new()
        .field(
            "type",
            Rules::of(FieldType::String)
                .required()
                .allowed(["list", "simple"]),
        )
        .field("db", identifier().required())
        .field("collection", identifier().required())
        .field("filter", Rules::of(FieldType::Dict).default_value(serde_json::json!({})))
        .field("projection", list_or_dict())
        .field(
            "order_by",
            Rules::of(FieldType::List)
                .depends_on("type", "list")
                .items(Rules::of(FieldType::String).regex(ORDER_FIELD)),
        )
        .field("list_projection", list_or_dict().depends_on("type", "list"))
        .field(
            "methods",
            keyed_by_identifier(METHOD).default_value(serde_json::json!({})),
        )
        .field("item_methods", keyed_by_identifier(ITEM_METHOD).depends_on("type", "list"))
        .field(
            "verbs",
            Rules::new().not_empty().default_value("*").anyof(vec![
                Rules::of(FieldType::String).allowed(["*"]),
                Rules::of(FieldType::List)
                    .depends_on("type", "list")
                    .allowed(ALL_VERBS),
                Rules::of(FieldType::List)
                    .depends_on("type", "simple")
                    .allowed(SIMPLE_VERBS),
            ]),
        )
        .field(
            "partials",
            keyed_by_identifier(PARTIAL).default_value(serde_json::json!({})),
        )
        .field("schema", Rules::of(FieldType::Dict).default_value(serde_json::json!({})))
        .field("soft_delete", Rules::of(FieldType::Boolean).default_value(false))
}

fn settings() -> Schema {
    let connection = Schema::new()
        .field(
            "host",
            Rules::of(FieldType::String)
                .not_empty()
                .default_env("MONGODB_HOST", "localhost"),
        )
        .field(
            "port",
            Rules::of(FieldType::Integer)
                .min(1.0)
                .default_env("MONGODB_PORT", 27017),
        )
        .field("user", Rules::of(FieldType::String).default_env("MONGODB_USER", ""))
        .field(
            "password",
            Rules::of(FieldType::String).default_env("MONGODB_PASSWORD", ""),
        );

    let auth = Schema::new()
        .field("enabled", Rules::of(FieldType::Boolean).default_value(true))
        .field("db", identifier().default_env("APP_AUTH_DB", "http_storage"))
        .field("collection", identifier().default_env("APP_AUTH_COLLECTION", "auth"));

    Schema::new()
        .field(
            "connection",
            Rules::of(FieldType::Dict)
                .default_value(serde_json::json!({}))
                .schema(connection),
        )
        .field(
            "auth",
            Rules::of(FieldType::Dict)
                .default_value(serde_json::json!({}))
                .schema(auth),
        )
        .field(
            "max_results",
            Rules::of(FieldType::Integer)
                .min(1.0)
                .default_env("MAX_RESULTS", 20),
        )
        .field(
            "schemas",
            Rules::of(FieldType::Dict)
                .default_value(serde_json::json!({}))
                .keysrules(identifier())
                .valuesrules(Rules::of(FieldType::Dict)),
        )
        .field("resources", keyed_by_identifier(RESOURCE).required())
}

/// All grammar definitions, by name
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(SETTINGS, settings())
        .with(RESOURCE, resource())
        .with(METHOD, method())
        .with(ITEM_METHOD, method())
        .with(PARTIAL, partial())
}
