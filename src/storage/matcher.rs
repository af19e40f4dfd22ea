//! Filter, sort and update evaluation over JSON documents
//!
//! Covers the subset of the MongoDB query language the framework emits:
//! literal equality, `$eq`, `$ne`, `$in`, `$nin`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$exists`, `$not`, `$and`, `$or` in filters and `$set`, `$unset`
//! in updates. Field names may be dotted paths.

use crate::core::json::{as_datetime, as_object_id};
use crate::core::store::{SortDirection, SortKey};
use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Cross-type ordering bracket, lowest first
fn rank(value: &Value) -> u8 {
    if as_object_id(value).is_some() {
        return 5;
    }
    if as_datetime(value).is_some() {
        return 7;
    }
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 6,
    }
}

/// Total order over document values
pub fn compare(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match ra {
        5 => as_object_id(a).map(|x| x.bytes()).cmp(&as_object_id(b).map(|y| y.bytes())),
        7 => as_datetime(a).cmp(&as_datetime(b)),
        _ => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Array(x), Value::Array(y)) => x
                .iter()
                .zip(y.iter())
                .map(|(l, r)| compare(l, r))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| x.len().cmp(&y.len())),
            (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
            _ => Ordering::Equal,
        },
    }
}

/// Resolve a dotted path; numeric segments index into arrays
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_operator_document(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.is_empty()
                && map.keys().all(|k| k.starts_with('$'))
                && as_object_id(value).is_none()
                && as_datetime(value).is_none()
        }
        _ => false,
    }
}

/// Equality with the array-contains rule: an array field equals a scalar it holds
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(actual) => {
            compare(actual, expected).is_eq()
                || matches!(actual, Value::Array(items) if items.iter().any(|i| compare(i, expected).is_eq()))
        }
    }
}

fn ordered(actual: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    let check = |v: &Value| rank(v) == rank(bound) && accept(compare(v, bound));
    match actual {
        None => false,
        Some(Value::Array(items)) if rank(bound) != 4 => items.iter().any(check),
        Some(v) => check(v),
    }
}

fn operators(actual: Option<&Value>, ops: &Map<String, Value>) -> Result<bool> {
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, arg),
            "$ne" => !equals(actual, arg),
            "$in" => in_list(actual, arg)?,
            "$nin" => !in_list(actual, arg)?,
            "$gt" => ordered(actual, arg, Ordering::is_gt),
            "$gte" => ordered(actual, arg, Ordering::is_ge),
            "$lt" => ordered(actual, arg, Ordering::is_lt),
            "$lte" => ordered(actual, arg, Ordering::is_le),
            "$exists" => arg.as_bool().ok_or_else(|| anyhow!("$exists expects a boolean"))? == actual.is_some(),
            "$not" => {
                let inner = arg
                    .as_object()
                    .filter(|_| is_operator_document(arg))
                    .ok_or_else(|| anyhow!("$not expects an operator document"))?;
                !operators(actual, inner)?
            }
            other => bail!("unsupported filter operator {}", other),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(actual: Option<&Value>, arg: &Value) -> Result<bool> {
    let candidates = arg.as_array().ok_or_else(|| anyhow!("$in/$nin expect an array"))?;
    Ok(candidates.iter().any(|c| equals(actual, c)))
}

fn clauses(arg: &Value, op: &str) -> Result<Vec<Value>> {
    match arg {
        Value::Array(items) if !items.is_empty() => Ok(items.clone()),
        _ => bail!("{} expects a non-empty array", op),
    }
}

/// Whether `document` satisfies `filter`
pub fn matches(document: &Value, filter: &Value) -> Result<bool> {
    let filter = match filter {
        Value::Null => return Ok(true),
        Value::Object(map) => map,
        other => bail!("filter must be a document, got {}", other),
    };

    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition, "$and")? {
                    all &= matches(document, &clause)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(condition, "$or")? {
                    any |= matches(document, &clause)?;
                }
                any
            }
            op if op.starts_with('$') => bail!("unsupported top-level operator {}", op),
            field => {
                let actual = lookup(document, field);
                match condition {
                    Value::Object(ops) if is_operator_document(condition) => operators(actual, ops)?,
                    literal => equals(actual, literal),
                }
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Stable sort by the given keys; missing fields sort as null
pub fn sort_documents(documents: &mut [Value], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let null = Value::Null;
                let left = lookup(a, &key.field).unwrap_or(&null);
                let right = lookup(b, &key.field).unwrap_or(&null);
                match key.direction {
                    SortDirection::Ascending => compare(left, right),
                    SortDirection::Descending => compare(right, left),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn set_path(document: &mut Value, path: &str, value: Value) -> Result<()> {
    let mut segments = path.split('.').peekable();
    let mut node = document;
    while let Some(segment) = segments.next() {
        let map = node
            .as_object_mut()
            .ok_or_else(|| anyhow!("cannot set '{}': '{}' is not a document", path, segment))?;
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return Ok(());
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

fn unset_path(document: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (lookup_mut(document, parent), leaf),
        None => (Some(document), path),
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(leaf);
    }
}

fn lookup_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(document, |node, segment| node.as_object_mut()?.get_mut(segment))
}

/// Apply a `$set` / `$unset` update document in place
pub fn apply_update(document: &mut Value, update: &Value) -> Result<()> {
    let update = update
        .as_object()
        .ok_or_else(|| anyhow!("update must be a document"))?;
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| anyhow!("{} expects a document", op))?;
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    if path == "_id" {
                        bail!("_id is immutable");
                    }
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            other => bail!("unsupported update operator {}", other),
        }
    }
    Ok(())
}
