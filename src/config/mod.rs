//! Configuration loading and management
//!
//! Settings are read from YAML (or any `serde_json::Value`), validated and
//! normalized against the settings grammar, and then turned into typed
//! [`Settings`]. Any problem is a [`ConfigError`], meant to stop startup.

use crate::core::error::ConfigError;
use crate::core::resource::ResourceDefinition;
use crate::core::schema::{self, Mode, Schema, SchemaCache, SchemaRegistry, grammar};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Document database connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl ConnectionConfig {
    /// `mongodb://` connection string; credentials are only added when a user is set
    pub fn uri(&self) -> String {
        if self.user.is_empty() {
            format!("mongodb://{}:{}", self.host, self.port)
        } else {
            format!(
                "mongodb://{}:{}@{}:{}",
                self.user, self.password, self.host, self.port
            )
        }
    }
}

/// Where bearer tokens are looked up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub db: String,
    pub collection: String,
}

fn default_true() -> bool {
    true
}

/// Normalized top-level shape, minus the parts that need custom conversion
#[derive(Debug, Deserialize)]
struct RawSettings {
    connection: ConnectionConfig,
    auth: AuthConfig,
    max_results: u64,
    #[serde(default)]
    schemas: IndexMap<String, Value>,
    resources: IndexMap<String, Value>,
}

/// Complete, validated settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub auth: AuthConfig,
    /// Upper bound (and default) for `limit` on list requests
    pub max_results: u64,
    /// Named schemas referenced from resource schemas
    pub schemas: SchemaRegistry,
    pub resources: IndexMap<String, Arc<ResourceDefinition>>,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigError::IoError {
                message: format!("{}: {}", path.display(), e),
            },
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                file: Some(path.display().to_string()),
                message,
            },
            other => other,
        })
    }

    /// Load settings from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(&raw)
    }

    /// Validate, normalize and convert a raw settings document
    pub fn from_value(raw: &Value) -> Result<Self, ConfigError> {
        let normalized = normalize(raw)?;
        let settings: RawSettings =
            serde_json::from_value(normalized).map_err(|e| ConfigError::ParseError {
                file: None,
                message: e.to_string(),
            })?;

        let mut schemas = SchemaRegistry::new();
        for (name, definition) in &settings.schemas {
            let schema = Schema::from_value(definition, &format!("schemas.{}", name))
                .map_err(|e| ConfigError::schema(name.as_str(), e))?;
            schemas.register(name.clone(), schema);
        }

        let mut resources = IndexMap::with_capacity(settings.resources.len());
        for (name, value) in &settings.resources {
            let definition = ResourceDefinition::from_value(name, value)?;
            resources.insert(name.clone(), Arc::new(definition));
        }

        let settings = Self {
            connection: settings.connection,
            auth: settings.auth,
            max_results: settings.max_results,
            schemas,
            resources,
        };
        settings.check_schemas(&SchemaCache::new())?;

        tracing::info!(
            resources = settings.resources.len(),
            schemas = settings.schemas.names().count(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Compile every resource schema, failing on unresolved references
    ///
    /// Compiled schemas land in `cache`, so passing the application cache
    /// pre-warms it.
    pub fn check_schemas(&self, cache: &SchemaCache) -> Result<(), ConfigError> {
        for definition in self.resources.values() {
            cache
                .get_or_compile(&definition.document_schema, &self.schemas)
                .map_err(|e| ConfigError::schema(definition.name.as_str(), e))?;
        }
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&Arc<ResourceDefinition>> {
        self.resources.get(name)
    }
}

/// Validate a raw settings document against the grammar and return its
/// normalized form (defaults applied)
pub fn normalize(raw: &Value) -> Result<Value, ConfigError> {
    let registry = grammar::registry();
    let root = registry
        .get(grammar::SETTINGS)
        .ok_or_else(|| ConfigError::UnresolvedSchema {
            name: grammar::SETTINGS.to_string(),
        })?;
    let compiled = schema::compile(root, &registry).map_err(|e| ConfigError::schema("settings", e))?;
    schema::validate(&compiled, raw, Mode::Full).map_err(ConfigError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{ResourceKind, VerbPolicy};
    use std::io::Write;

    const BLOG: &str = r#"
connection:
  host: db.internal
  port: 27018
auth:
  db: accounts
  collection: tokens
max_results: 50
schemas:
  comment:
    text: {type: string, required: true}
    replies:
      type: list
      schema: {type: dict, schema: comment}
resources:
  posts:
    type: list
    db: blog
    collection: posts
    order_by: ["-published"]
    schema:
      title: {type: string, required: true}
      published: {type: datetime}
      comments:
        type: list
        schema: {type: dict, schema: comment}
    partials:
      comments:
        field_name: comments
        field_type: list
  about:
    type: simple
    db: blog
    collection: pages
    filter: {slug: about}
    verbs: [read, update]
"#;

    #[test]
    fn test_load_from_yaml_str() {
        let settings = Settings::from_yaml_str(BLOG).unwrap();
        assert_eq!(settings.connection.host, "db.internal");
        assert_eq!(settings.connection.port, 27018);
        assert_eq!(settings.auth.collection, "tokens");
        assert!(settings.auth.enabled);
        assert_eq!(settings.max_results, 50);
        assert!(settings.schemas.contains("comment"));

        let posts = settings.resource("posts").unwrap();
        assert_eq!(posts.kind, ResourceKind::List);
        assert_eq!(posts.verbs, VerbPolicy::All);
        assert!(posts.partials.contains_key("comments"));

        let about = settings.resource("about").unwrap();
        assert_eq!(about.kind, ResourceKind::Simple);
        assert!(matches!(about.verbs, VerbPolicy::Only(_)));
    }

    #[test]
    fn test_resource_order_is_preserved() {
        let settings = Settings::from_yaml_str(BLOG).unwrap();
        let names: Vec<&str> = settings.resources.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["posts", "about"]);
    }

    #[test]
    fn test_grammar_errors_are_reported_together() {
        let err = Settings::from_yaml_str(
            r#"
resources:
  items:
    type: list
    db: shop
    colection: items
"#,
        )
        .unwrap_err();
        let ConfigError::Invalid(errors) = err else {
            panic!("expected grammar errors, got {err}");
        };
        let mut fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["resources.items.collection", "resources.items.colection"]);
    }

    #[test]
    fn test_unresolved_schema_reference() {
        let err = Settings::from_yaml_str(
            r#"
resources:
  items:
    type: list
    db: shop
    collection: items
    schema:
      owner: {type: dict, schema: person}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedSchema { ref name } if name == "person"));
    }

    #[test]
    fn test_invalid_user_schema() {
        let err = Settings::from_yaml_str(
            r#"
resources:
  items:
    type: list
    db: shop
    collection: items
    schema:
      price: {type: money}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSchema { .. }));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = Settings::from_yaml_str("resources: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BLOG.as_bytes()).unwrap();
        let settings = Settings::from_yaml_file(file.path()).unwrap();
        assert_eq!(settings.resources.len(), 2);

        let missing = Settings::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(missing, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_connection_uri() {
        let mut connection = ConnectionConfig {
            host: "localhost".to_string(),
            port: 27017,
            user: String::new(),
            password: String::new(),
        };
        assert_eq!(connection.uri(), "mongodb://localhost:27017");
        connection.user = "app".to_string();
        connection.password = "pw".to_string();
        assert_eq!(connection.uri(), "mongodb://app:pw@localhost:27017");
    }
}
