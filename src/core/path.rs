//! Weak-resource paths
//!
//! A resource may declare a tree of [`PathPartial`]s describing which nested
//! members of its documents can be addressed from a URL. [`resolve_path`]
//! turns raw URL segments into typed [`AccessStep`]s against that tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a partial's field is de-referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialType {
    /// Taken as-is, whatever its stored type
    Scalar,
    /// Followed by an integer index segment (optional at the end of a path)
    List,
    /// Followed by a mandatory string key segment
    Dict,
}

/// One node of a weak-resource declaration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathPartial {
    pub field_name: String,
    pub field_type: PartialType,
    #[serde(default)]
    pub children: PartialTree,
}

/// Segment name -> partial
pub type PartialTree = BTreeMap<String, PathPartial>;

/// A subscript applied after a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Subscript {
    Index(usize),
    Key(String),
}

impl fmt::Display for Subscript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscript::Index(i) => write!(f, "[{}]", i),
            Subscript::Key(k) => write!(f, "[{:?}]", k),
        }
    }
}

/// One resolved de-referencing step: a field, then an optional subscript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessStep {
    pub field: String,
    pub subscript: Option<Subscript>,
}

impl AccessStep {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            subscript: None,
        }
    }

    pub fn indexed(field: impl Into<String>, index: usize) -> Self {
        Self {
            field: field.into(),
            subscript: Some(Subscript::Index(index)),
        }
    }

    pub fn keyed(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            subscript: Some(Subscript::Key(key.into())),
        }
    }
}

enum State<'a> {
    ExpectSegment(&'a PartialTree),
    ExpectSubscript(&'a PathPartial),
}

/// Resolve URL segments against a partial tree
///
/// Returns `None` for any malformed or undeclared path; callers treat that as
/// "not found". An empty segment list always resolves to zero steps.
pub fn resolve_path<S: AsRef<str>>(tree: &PartialTree, segments: &[S]) -> Option<Vec<AccessStep>> {
    let mut steps: Vec<AccessStep> = Vec::with_capacity(segments.len());
    let mut state = State::ExpectSegment(tree);

    for segment in segments {
        let segment = segment.as_ref();
        state = match state {
            State::ExpectSegment(scope) => {
                let partial = scope.get(segment)?;
                steps.push(AccessStep::field(partial.field_name.as_str()));
                match partial.field_type {
                    PartialType::Scalar => State::ExpectSegment(&partial.children),
                    PartialType::List | PartialType::Dict => State::ExpectSubscript(partial),
                }
            }
            State::ExpectSubscript(partial) => {
                let subscript = match partial.field_type {
                    PartialType::List => Subscript::Index(segment.parse::<usize>().ok()?),
                    _ => Subscript::Key(segment.to_string()),
                };
                steps.last_mut()?.subscript = Some(subscript);
                State::ExpectSegment(&partial.children)
            }
        };
    }

    match state {
        State::ExpectSubscript(partial) if partial.field_type == PartialType::Dict => None,
        _ => Some(steps),
    }
}
