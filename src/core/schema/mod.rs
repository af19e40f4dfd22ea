//! Schema rule language
//!
//! One recursive rule language describes both the framework's own
//! configuration grammar ([`grammar`]) and the document schemas users attach
//! to their resources. A [`Schema`] maps field names to [`Rules`]; rules can
//! nest further schemas inline or refer to a named definition held by a
//! [`SchemaRegistry`], which is how self-referential shapes are written.
//!
//! Schemas are plain data. [`compile`] turns them into a [`CompiledSchema`]
//! (regexes built, named references resolved to arena nodes) and
//! [`SchemaCache`] memoizes that per schema instance.

pub mod coerce;
pub mod compile;
pub mod grammar;
pub mod validate;

pub use compile::{CompiledSchema, SchemaCache, SchemaRegistry, compile};
pub use validate::{Mode, validate};

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while reading or compiling a schema
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("unknown rule '{rule}' at '{path}'")]
    UnknownRule { path: String, rule: String },

    #[error("invalid rule '{rule}' at '{path}': {message}")]
    InvalidRule {
        path: String,
        rule: String,
        message: String,
    },

    #[error("unknown type '{name}' at '{path}'")]
    UnknownType { path: String, name: String },

    #[error("schema reference '{0}' cannot be resolved")]
    Unresolved(String),

    #[error("invalid regex '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Leaf and container types a rule can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Number,
    Boolean,
    Dict,
    List,
    ObjectId,
    Date,
    DateTime,
}

impl FieldType {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => FieldType::String,
            "integer" => FieldType::Integer,
            "float" => FieldType::Float,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "dict" => FieldType::Dict,
            "list" => FieldType::List,
            "objectid" => FieldType::ObjectId,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Dict => "dict",
            FieldType::List => "list",
            FieldType::ObjectId => "objectid",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
        }
    }

    /// Whether an already-coerced value has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_f64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Dict => value.is_object(),
            FieldType::List => value.is_array(),
            FieldType::ObjectId => crate::core::json::as_object_id(value).is_some(),
            FieldType::Date | FieldType::DateTime => {
                crate::core::json::as_datetime(value).is_some()
            }
        }
    }
}

/// Where a missing field's default comes from
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    /// Read from the process environment, falling back to a literal
    Env { var: String, fallback: Value },
}

impl DefaultValue {
    /// Produce the default. Environment values are parsed as integers when
    /// the field is integer-typed; an unparsable value is kept as a string so
    /// that validation reports it instead of silently falling back.
    pub fn resolve(&self, types: &[FieldType]) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Env { var, fallback } => match std::env::var(var) {
                Ok(raw) if types.contains(&FieldType::Integer) => raw
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or(Value::String(raw)),
                Ok(raw) => Value::String(raw),
                Err(_) => fallback.clone(),
            },
        }
    }
}

/// A nested mapping schema, inline or by name
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaRef {
    Inline(Arc<Schema>),
    Named(String),
}

/// A sibling condition: `field` must hold one of `values` (any value when empty)
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub field: String,
    pub values: Vec<Value>,
}

/// Rules for a single field
#[derive(Debug, Clone, PartialEq)]
pub struct Rules {
    pub types: Vec<FieldType>,
    pub required: bool,
    pub nullable: bool,
    pub empty: bool,
    pub allowed: Option<Vec<Value>>,
    pub regex: Option<String>,
    pub default: Option<DefaultValue>,
    pub dependencies: Vec<Dependency>,
    pub anyof: Vec<Rules>,
    /// Field schema for dict values
    pub schema: Option<SchemaRef>,
    /// Per-item rules for list values
    pub items: Option<Box<Rules>>,
    pub keysrules: Option<Box<Rules>>,
    pub valuesrules: Option<Box<Rules>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub minlength: Option<usize>,
    pub maxlength: Option<usize>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            required: false,
            nullable: false,
            empty: true,
            allowed: None,
            regex: None,
            default: None,
            dependencies: Vec::new(),
            anyof: Vec::new(),
            schema: None,
            items: None,
            keysrules: None,
            valuesrules: None,
            min: None,
            max: None,
            minlength: None,
            maxlength: None,
        }
    }
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(field_type: FieldType) -> Self {
        Self::new().or_type(field_type)
    }

    pub fn or_type(mut self, field_type: FieldType) -> Self {
        self.types.push(field_type);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn not_empty(mut self) -> Self {
        self.empty = false;
        self
    }

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn regex(mut self, pattern: &str) -> Self {
        self.regex = Some(pattern.to_string());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_env(mut self, var: &str, fallback: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Env {
            var: var.to_string(),
            fallback: fallback.into(),
        });
        self
    }

    pub fn depends_on(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.dependencies.push(Dependency {
            field: field.to_string(),
            values: vec![value.into()],
        });
        self
    }

    pub fn anyof(mut self, alternatives: Vec<Rules>) -> Self {
        self.anyof = alternatives;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(SchemaRef::Inline(Arc::new(schema)));
        self
    }

    pub fn schema_ref(mut self, name: &str) -> Self {
        self.schema = Some(SchemaRef::Named(name.to_string()));
        self
    }

    pub fn items(mut self, rules: Rules) -> Self {
        self.items = Some(Box::new(rules));
        self
    }

    pub fn keysrules(mut self, rules: Rules) -> Self {
        self.keysrules = Some(Box::new(rules));
        self
    }

    pub fn valuesrules(mut self, rules: Rules) -> Self {
        self.valuesrules = Some(Box::new(rules));
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Read a rule set from its JSON/YAML form
    pub fn from_value(value: &Value, path: &str) -> Result<Self, SchemaError> {
        let map = value.as_object().ok_or_else(|| SchemaError::InvalidRule {
            path: path.to_string(),
            rule: "*".to_string(),
            message: "rules must be a mapping".to_string(),
        })?;

        let invalid = |rule: &str, message: &str| SchemaError::InvalidRule {
            path: path.to_string(),
            rule: rule.to_string(),
            message: message.to_string(),
        };

        let mut rules = Rules::new();
        let mut raw_schema: Option<&Value> = None;

        for (rule, arg) in map {
            match rule.as_str() {
                "type" => {
                    let names: Vec<&str> = match arg {
                        Value::String(s) => vec![s.as_str()],
                        Value::Array(items) => items
                            .iter()
                            .map(|v| v.as_str().ok_or_else(|| invalid(rule, "type names must be strings")))
                            .collect::<Result<_, _>>()?,
                        _ => return Err(invalid(rule, "expected a type name or a list of them")),
                    };
                    for name in names {
                        let field_type = FieldType::parse(name).ok_or_else(|| SchemaError::UnknownType {
                            path: path.to_string(),
                            name: name.to_string(),
                        })?;
                        rules.types.push(field_type);
                    }
                }
                "required" => rules.required = bool_arg(arg).ok_or_else(|| invalid(rule, "expected a boolean"))?,
                "nullable" => rules.nullable = bool_arg(arg).ok_or_else(|| invalid(rule, "expected a boolean"))?,
                "empty" => rules.empty = bool_arg(arg).ok_or_else(|| invalid(rule, "expected a boolean"))?,
                "allowed" => {
                    let values = arg.as_array().ok_or_else(|| invalid(rule, "expected a list"))?;
                    rules.allowed = Some(values.clone());
                }
                "regex" => {
                    let pattern = arg.as_str().ok_or_else(|| invalid(rule, "expected a string"))?;
                    rules.regex = Some(pattern.to_string());
                }
                "default" => rules.default = Some(DefaultValue::Value(arg.clone())),
                "dependencies" => rules.dependencies = parse_dependencies(arg).ok_or_else(|| {
                    invalid(rule, "expected a field name, a list of names or a mapping")
                })?,
                "anyof" => {
                    let alternatives = arg.as_array().ok_or_else(|| invalid(rule, "expected a list"))?;
                    rules.anyof = alternatives
                        .iter()
                        .enumerate()
                        .map(|(i, alt)| Rules::from_value(alt, &format!("{}.anyof.{}", path, i)))
                        .collect::<Result<_, _>>()?;
                }
                "schema" => raw_schema = Some(arg),
                "keysrules" => {
                    rules.keysrules = Some(Box::new(Rules::from_value(arg, &format!("{}.keysrules", path))?))
                }
                "valuesrules" => {
                    rules.valuesrules =
                        Some(Box::new(Rules::from_value(arg, &format!("{}.valuesrules", path))?))
                }
                "min" => rules.min = Some(arg.as_f64().ok_or_else(|| invalid(rule, "expected a number"))?),
                "max" => rules.max = Some(arg.as_f64().ok_or_else(|| invalid(rule, "expected a number"))?),
                "minlength" => {
                    rules.minlength = Some(usize_arg(arg).ok_or_else(|| invalid(rule, "expected a length"))?)
                }
                "maxlength" => {
                    rules.maxlength = Some(usize_arg(arg).ok_or_else(|| invalid(rule, "expected a length"))?)
                }
                other => {
                    return Err(SchemaError::UnknownRule {
                        path: path.to_string(),
                        rule: other.to_string(),
                    });
                }
            }
        }

        // `schema` means per-item rules for lists and a field mapping otherwise
        if let Some(arg) = raw_schema {
            let is_list = rules.types.contains(&FieldType::List) && !rules.types.contains(&FieldType::Dict);
            match arg {
                Value::String(name) => rules.schema = Some(SchemaRef::Named(name.clone())),
                _ if is_list => rules.items = Some(Box::new(Rules::from_value(arg, &format!("{}.schema", path))?)),
                _ => {
                    let nested = Schema::from_value(arg, &format!("{}.schema", path))?;
                    rules.schema = Some(SchemaRef::Inline(Arc::new(nested)));
                }
            }
        }

        Ok(rules)
    }
}

fn bool_arg(value: &Value) -> Option<bool> {
    value.as_bool()
}

fn usize_arg(value: &Value) -> Option<usize> {
    value.as_u64().map(|n| n as usize)
}

fn parse_dependencies(value: &Value) -> Option<Vec<Dependency>> {
    match value {
        Value::String(field) => Some(vec![Dependency {
            field: field.clone(),
            values: Vec::new(),
        }]),
        Value::Array(fields) => fields
            .iter()
            .map(|f| {
                f.as_str().map(|field| Dependency {
                    field: field.to_string(),
                    values: Vec::new(),
                })
            })
            .collect(),
        Value::Object(map) => Some(
            map.iter()
                .map(|(field, expected)| Dependency {
                    field: field.clone(),
                    values: match expected {
                        Value::Array(values) => values.clone(),
                        single => vec![single.clone()],
                    },
                })
                .collect(),
        ),
        _ => None,
    }
}

/// A mapping schema: field name -> rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub fields: IndexMap<String, Rules>,
    /// Keep fields the schema does not mention instead of rejecting them
    pub allow_unknown: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field declaration
    pub fn field(mut self, name: &str, rules: Rules) -> Self {
        self.fields.insert(name.to_string(), rules);
        self
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read a schema from its JSON/YAML form (`{field: rules, ...}`)
    ///
    /// The reserved key `allow_unknown` toggles strictness for this level.
    pub fn from_value(value: &Value, path: &str) -> Result<Self, SchemaError> {
        let map = value.as_object().ok_or_else(|| SchemaError::InvalidRule {
            path: path.to_string(),
            rule: "schema".to_string(),
            message: "a schema must be a mapping of field names to rules".to_string(),
        })?;

        let mut schema = Schema::new();
        for (name, rules) in map {
            if name == "allow_unknown" {
                schema.allow_unknown = rules.as_bool().ok_or_else(|| SchemaError::InvalidRule {
                    path: path.to_string(),
                    rule: "allow_unknown".to_string(),
                    message: "expected a boolean".to_string(),
                })?;
                continue;
            }
            let field_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", path, name)
            };
            schema
                .fields
                .insert(name.clone(), Rules::from_value(rules, &field_path)?);
        }
        Ok(schema)
    }
}
