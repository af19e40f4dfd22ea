//! Field projections
//!
//! A projection arrives either as a list of field names (an inclusion) or as a
//! `field -> bool` map whose flags must all agree. It is normalized once into
//! [`Projection::Include`] or [`Projection::Exclude`] so nothing downstream has
//! to re-derive the decision.

use indexmap::IndexSet;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while normalizing a projection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// Inclusion and exclusion flags were mixed in the same map
    #[error("projection must not mix inclusions and exclusions")]
    Conflict,

    /// The projection has an unusable shape
    #[error("invalid projection: {0}")]
    Invalid(String),
}

/// A normalized projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only these fields
    Include(IndexSet<String>),
    /// Drop these fields
    Exclude(IndexSet<String>),
}

impl Projection {
    /// Build an inclusion from a field list. An empty list means no projection.
    pub fn include<I, S>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: IndexSet<String> = fields.into_iter().map(Into::into).collect();
        (!fields.is_empty()).then_some(Projection::Include(fields))
    }

    /// Build an exclusion from a field list. An empty list means no projection.
    pub fn exclude<I, S>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: IndexSet<String> = fields.into_iter().map(Into::into).collect();
        (!fields.is_empty()).then_some(Projection::Exclude(fields))
    }

    /// Normalize a `field -> include` map
    ///
    /// Fails with [`ProjectionError::Conflict`] when both `true` and `false`
    /// appear, whatever the key order.
    pub fn from_flags<I, S>(flags: I) -> Result<Option<Self>, ProjectionError>
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let mut fields = IndexSet::new();
        let mut decision: Option<bool> = None;

        for (field, include) in flags {
            match decision {
                Some(previous) if previous != include => return Err(ProjectionError::Conflict),
                _ => decision = Some(include),
            }
            fields.insert(field.into());
        }

        Ok(match decision {
            None => None,
            Some(true) => Some(Projection::Include(fields)),
            Some(false) => Some(Projection::Exclude(fields)),
        })
    }

    /// Normalize a raw JSON projection (list of names, or map of flags)
    ///
    /// Map flags may be booleans or numbers (`0` excludes, anything else
    /// includes), as document stores commonly accept both.
    pub fn from_value(value: &Value) -> Result<Option<Self>, ProjectionError> {
        match value {
            Value::Null => Ok(None),
            Value::Array(items) => {
                let names = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            ProjectionError::Invalid(format!("field names must be strings, got {}", item))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Projection::include(names))
            }
            Value::Object(map) => {
                let flags = map
                    .iter()
                    .map(|(field, flag)| {
                        let include = match flag {
                            Value::Bool(b) => *b,
                            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                            other => {
                                return Err(ProjectionError::Invalid(format!(
                                    "flag for '{}' must be a boolean, got {}",
                                    field, other
                                )));
                            }
                        };
                        Ok((field.clone(), include))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Projection::from_flags(flags)
            }
            other => Err(ProjectionError::Invalid(format!(
                "expected a list or a map, got {}",
                other
            ))),
        }
    }

    /// The fields named by this projection
    pub fn fields(&self) -> &IndexSet<String> {
        match self {
            Projection::Include(fields) | Projection::Exclude(fields) => fields,
        }
    }

    pub fn is_inclusion(&self) -> bool {
        matches!(self, Projection::Include(_))
    }

    /// Store-level representation (`{field: 1}` / `{field: 0}`)
    pub fn to_store_value(&self) -> Value {
        let flag = if self.is_inclusion() { 1 } else { 0 };
        Value::Object(
            self.fields()
                .iter()
                .map(|field| (field.clone(), Value::from(flag)))
                .collect(),
        )
    }

    /// Apply to a traversed mapping
    ///
    /// Inclusion yields exactly the listed keys, absent ones as `null`.
    /// Exclusion yields the mapping minus the listed keys.
    pub fn apply(&self, mut value: Map<String, Value>) -> Map<String, Value> {
        match self {
            Projection::Include(fields) => fields
                .iter()
                .map(|field| (field.clone(), value.remove(field).unwrap_or(Value::Null)))
                .collect(),
            Projection::Exclude(fields) => {
                for field in fields {
                    value.remove(field);
                }
                value
            }
        }
    }

    /// Apply with document-store semantics to a top-level document
    ///
    /// Inclusion always keeps `_id` and omits absent keys, the way a store
    /// projection behaves.
    pub fn apply_to_document(&self, mut document: Map<String, Value>) -> Map<String, Value> {
        match self {
            Projection::Include(fields) => {
                let mut projected = Map::new();
                if let Some(id) = document.remove("_id") {
                    projected.insert("_id".to_string(), id);
                }
                for field in fields {
                    if let Some(v) = document.remove(field) {
                        projected.insert(field.clone(), v);
                    }
                }
                projected
            }
            Projection::Exclude(_) => self.apply(document),
        }
    }
}

/// Apply an optional projection to a mapping; `None` leaves it unchanged
pub fn apply_projection(
    value: Map<String, Value>,
    projection: Option<&Projection>,
) -> Map<String, Value> {
    match projection {
        Some(projection) => projection.apply(value),
        None => value,
    }
}
