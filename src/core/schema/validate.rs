//! Validation and normalization against a compiled schema
//!
//! Validation produces a normalized copy of the input: defaults filled in,
//! leaf strings coerced to their extended JSON form, unknown fields dropped
//! or kept according to the mapping's `allow_unknown`. Every problem is
//! collected with its dotted field path instead of stopping at the first.

use super::coerce::coerce;
use super::compile::{CompiledRules, CompiledSchema, NodeId};
use super::FieldType;
use crate::core::error::FieldValidationError;
use serde_json::{Map, Value};

/// How strictly the top-level mapping is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Required fields enforced, defaults applied
    Full,
    /// Only the fields present are checked; no required rule, no defaults.
    /// Nested mappings are still validated in full.
    Partial,
}

/// Validate `document` (which must be a mapping) and return its normalized form
pub fn validate(
    schema: &CompiledSchema,
    document: &Value,
    mode: Mode,
) -> Result<Value, Vec<FieldValidationError>> {
    let Some(map) = document.as_object() else {
        return Err(vec![FieldValidationError::new("", "must be of dict type")]);
    };

    let mut validator = Validator {
        schema,
        errors: Vec::new(),
    };
    let normalized = validator.mapping(schema.root(), map, "", mode);

    if validator.errors.is_empty() {
        Ok(Value::Object(normalized))
    } else {
        Err(validator.errors)
    }
}

struct Validator<'s> {
    schema: &'s CompiledSchema,
    errors: Vec<FieldValidationError>,
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn dependencies_met(rules: &CompiledRules, siblings: &Map<String, Value>) -> Result<(), String> {
    for dependency in &rules.dependencies {
        match siblings.get(&dependency.field) {
            None => return Err(format!("field '{}' is required", dependency.field)),
            Some(actual) if !dependency.values.is_empty() && !dependency.values.contains(actual) => {
                return Err(format!(
                    "depends on these values: {{'{}': {}}}",
                    dependency.field,
                    Value::Array(dependency.values.clone())
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

impl<'s> Validator<'s> {
    fn fail(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(FieldValidationError::new(path, message));
    }

    fn mapping(&mut self, id: NodeId, input: &Map<String, Value>, path: &str, mode: Mode) -> Map<String, Value> {
        let schema = self.schema;
        let node = schema.node(id);
        let mut working = input.clone();

        if mode == Mode::Full {
            for (name, rules) in &node.fields {
                if working.contains_key(name) {
                    continue;
                }
                if let Some(default) = &rules.default {
                    // a default never introduces a field whose dependencies fail
                    if dependencies_met(rules, &working).is_ok() {
                        working.insert(name.clone(), default.resolve(&rules.types));
                    }
                }
            }
        }

        let mut output = Map::new();
        for (key, value) in &working {
            let field_path = join(path, key);
            match node.fields.get(key) {
                Some(rules) => {
                    if let Some(normalized) = self.value(rules, value, &field_path, &working) {
                        output.insert(key.clone(), normalized);
                    }
                }
                None if node.allow_unknown => {
                    output.insert(key.clone(), value.clone());
                }
                None => self.fail(&field_path, "unknown field"),
            }
        }

        if mode == Mode::Full {
            for (name, rules) in &node.fields {
                if rules.required && !working.contains_key(name) {
                    self.fail(&join(path, name), "required field");
                }
            }
        }

        output
    }

    /// Validate one value, returning its normalized form when it is acceptable
    fn value(
        &mut self,
        rules: &CompiledRules,
        value: &Value,
        path: &str,
        siblings: &Map<String, Value>,
    ) -> Option<Value> {
        if value.is_null() {
            if rules.nullable {
                return Some(Value::Null);
            }
            self.fail(path, "null value not allowed");
            return None;
        }

        if let Err(message) = dependencies_met(rules, siblings) {
            self.fail(path, message);
            return None;
        }

        let value = match coerce(&rules.types, value.clone()) {
            Ok(v) => v,
            Err(message) => {
                self.fail(path, message);
                return None;
            }
        };

        if !rules.types.is_empty() && !rules.types.iter().any(|t| t.matches(&value)) {
            let names: Vec<&str> = rules.types.iter().map(FieldType::name).collect();
            self.fail(path, format!("must be of {} type", names.join(" or ")));
            return None;
        }

        let before = self.errors.len();
        self.constraints(rules, &value, path);
        if self.errors.len() > before {
            return None;
        }

        let value = if rules.anyof.is_empty() {
            value
        } else {
            self.anyof(rules, value, path, siblings)?
        };

        Some(self.nested(rules, value, path))
    }

    fn constraints(&mut self, rules: &CompiledRules, value: &Value, path: &str) {
        if !rules.empty && is_empty(value) {
            self.fail(path, "empty values not allowed");
        }

        if let Some(allowed) = &rules.allowed {
            match value {
                Value::Array(items) => {
                    let rejected: Vec<&Value> = items.iter().filter(|i| !allowed.contains(i)).collect();
                    if !rejected.is_empty() {
                        let rejected = Value::Array(rejected.into_iter().cloned().collect());
                        self.fail(path, format!("unallowed values {}", rejected));
                    }
                }
                other if !allowed.contains(other) => {
                    self.fail(path, format!("unallowed value {}", other));
                }
                _ => {}
            }
        }

        if let (Some((pattern, regex)), Value::String(s)) = (&rules.regex, value) {
            if !regex.is_match(s) {
                self.fail(path, format!("value does not match regex '{}'", pattern));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = rules.min.filter(|min| n < *min) {
                self.fail(path, format!("min value is {}", min));
            }
            if let Some(max) = rules.max.filter(|max| n > *max) {
                self.fail(path, format!("max value is {}", max));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = length {
            if let Some(min) = rules.minlength.filter(|min| len < *min) {
                self.fail(path, format!("min length is {}", min));
            }
            if let Some(max) = rules.maxlength.filter(|max| len > *max) {
                self.fail(path, format!("max length is {}", max));
            }
        }
    }

    /// The first alternative that validates cleanly supplies the value
    fn anyof(
        &mut self,
        rules: &CompiledRules,
        value: Value,
        path: &str,
        siblings: &Map<String, Value>,
    ) -> Option<Value> {
        let mut reasons = Vec::new();
        for (i, alternative) in rules.anyof.iter().enumerate() {
            let mut probe = Validator {
                schema: self.schema,
                errors: Vec::new(),
            };
            match probe.value(alternative, &value, path, siblings) {
                Some(normalized) if probe.errors.is_empty() => return Some(normalized),
                _ => {
                    let why: Vec<String> = probe.errors.iter().map(|e| e.message.clone()).collect();
                    reasons.push(format!("definition {}: {}", i, why.join(", ")));
                }
            }
        }
        self.fail(path, format!("no definitions validate ({})", reasons.join("; ")));
        None
    }

    fn nested(&mut self, rules: &CompiledRules, value: Value, path: &str) -> Value {
        match value {
            Value::Object(map) => {
                let mut map = match rules.schema {
                    Some(id) => self.mapping(id, &map, path, Mode::Full),
                    None => map,
                };
                if let Some(keysrules) = &rules.keysrules {
                    for key in map.keys() {
                        self.value(keysrules, &Value::String(key.clone()), &join(path, key), &Map::new());
                    }
                }
                if let Some(valuesrules) = &rules.valuesrules {
                    let siblings = map.clone();
                    for (key, item) in map.iter_mut() {
                        if let Some(normalized) = self.value(valuesrules, item, &join(path, key), &siblings) {
                            *item = normalized;
                        }
                    }
                }
                Value::Object(map)
            }
            Value::Array(items) => match &rules.items {
                Some(item_rules) => {
                    let siblings = Map::new();
                    Value::Array(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| {
                                self.value(item_rules, item, &join(path, &i.to_string()), &siblings)
                                    .unwrap_or_else(|| item.clone())
                            })
                            .collect(),
                    )
                }
                None => Value::Array(items),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Rules, Schema, SchemaRegistry, compile};
    use serde_json::json;

    fn check(schema: &Schema, doc: Value, mode: Mode) -> Result<Value, Vec<FieldValidationError>> {
        let compiled = compile(schema, &SchemaRegistry::new()).unwrap();
        validate(&compiled, &doc, mode)
    }

    fn fields(errors: &[FieldValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    fn person() -> Schema {
        Schema::from_value(
            &json!({
                "name": {"type": "string", "required": true, "empty": false},
                "age": {"type": "integer", "min": 0},
                "role": {"type": "string", "allowed": ["admin", "user"], "default": "user"},
                "born": {"type": "date"},
                "address": {"type": "dict", "schema": {
                    "city": {"type": "string", "required": true}
                }},
                "tags": {"type": "list", "schema": {"type": "string", "regex": "[a-z]+"}}
            }),
            "",
        )
        .unwrap()
    }

    #[test]
    fn test_full_mode_normalizes() {
        let out = check(
            &person(),
            json!({"name": "Ada", "born": "1815-12-10", "tags": ["math"]}),
            Mode::Full,
        )
        .unwrap();
        assert_eq!(
            out,
            json!({
                "name": "Ada",
                "born": {"$date": "1815-12-10T00:00:00.000Z"},
                "tags": ["math"],
                "role": "user"
            })
        );
    }

    #[test]
    fn test_errors_carry_dotted_paths() {
        let errors = check(
            &person(),
            json!({
                "age": -1,
                "role": "root",
                "address": {},
                "tags": ["ok", "NOT"],
                "extra": true
            }),
            Mode::Full,
        )
        .unwrap_err();
        let mut got = fields(&errors);
        got.sort();
        assert_eq!(got, vec!["address.city", "age", "extra", "name", "role", "tags.1"]);
    }

    #[test]
    fn test_partial_mode_skips_required_and_defaults() {
        let out = check(&person(), json!({"age": 3}), Mode::Partial).unwrap();
        assert_eq!(out, json!({"age": 3}));

        // nested mappings are still complete documents
        let errors = check(&person(), json!({"address": {}}), Mode::Partial).unwrap_err();
        assert_eq!(fields(&errors), vec!["address.city"]);
    }

    #[test]
    fn test_type_and_null_checks() {
        let errors = check(&person(), json!({"name": 5}), Mode::Full).unwrap_err();
        assert_eq!(errors[0].message, "must be of string type");

        let errors = check(&person(), json!({"name": null}), Mode::Full).unwrap_err();
        assert_eq!(errors[0].message, "null value not allowed");

        let errors = check(&person(), json!({"name": ""}), Mode::Full).unwrap_err();
        assert_eq!(errors[0].message, "empty values not allowed");
    }

    #[test]
    fn test_anyof_and_dependencies() {
        let schema = Schema::new()
            .field("type", Rules::of(FieldType::String).allowed(["list", "simple"]))
            .field(
                "verbs",
                Rules::new().default_value("*").anyof(vec![
                    Rules::of(FieldType::String).allowed(["*"]),
                    Rules::of(FieldType::List)
                        .depends_on("type", "list")
                        .allowed(["list", "read"]),
                    Rules::of(FieldType::List)
                        .depends_on("type", "simple")
                        .allowed(["read"]),
                ]),
            );

        assert_eq!(
            check(&schema, json!({"type": "simple"}), Mode::Full).unwrap(),
            json!({"type": "simple", "verbs": "*"})
        );
        assert!(check(&schema, json!({"type": "list", "verbs": ["list"]}), Mode::Full).is_ok());

        let errors = check(&schema, json!({"type": "simple", "verbs": ["list"]}), Mode::Full).unwrap_err();
        assert_eq!(fields(&errors), vec!["verbs"]);
        assert!(errors[0].message.starts_with("no definitions validate"));
    }

    #[test]
    fn test_allow_unknown_keeps_fields() {
        let schema = Schema::new().allow_unknown().field("a", Rules::of(FieldType::Integer));
        assert_eq!(
            check(&schema, json!({"a": 1, "b": 2}), Mode::Full).unwrap(),
            json!({"a": 1, "b": 2})
        );
    }

    #[test]
    fn test_keys_and_values_rules() {
        let schema = Schema::new().field(
            "methods",
            Rules::of(FieldType::Dict)
                .keysrules(Rules::of(FieldType::String).regex("[a-z][a-z0-9_-]+"))
                .valuesrules(Rules::of(FieldType::Integer)),
        );
        assert!(check(&schema, json!({"methods": {"ok": 1}}), Mode::Full).is_ok());
        let errors = check(&schema, json!({"methods": {"Bad": 1, "fine": "x"}}), Mode::Full).unwrap_err();
        let mut got = fields(&errors);
        got.sort();
        assert_eq!(got, vec!["methods.Bad", "methods.fine"]);
    }

    #[test]
    fn test_non_mapping_document() {
        let errors = check(&person(), json!([1, 2]), Mode::Full).unwrap_err();
        assert_eq!(errors[0].message, "must be of dict type");
    }
}
