//! Schema compilation and caching
//!
//! Compilation resolves named references into an arena of mapping nodes and
//! builds every regex once. A name is bound to its arena slot before its
//! fields are compiled, so a definition that refers to itself (directly or
//! through others) resolves to the node already being built.

use super::{DefaultValue, Dependency, FieldType, Rules, Schema, SchemaError, SchemaRef};
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Named schema definitions available to `schema: <name>` references
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    definitions: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, schema: Schema) {
        self.definitions.insert(name.into(), Arc::new(schema));
    }

    pub fn with(mut self, name: &str, schema: Schema) -> Self {
        self.register(name, schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Merge another registry into this one; existing names win
    pub fn extend(&mut self, other: &SchemaRegistry) {
        for (name, schema) in &other.definitions {
            self.definitions
                .entry(name.clone())
                .or_insert_with(|| schema.clone());
        }
    }
}

/// Index of a mapping node inside a [`CompiledSchema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Default)]
pub(crate) struct CompiledNode {
    pub fields: IndexMap<String, CompiledRules>,
    pub allow_unknown: bool,
}

#[derive(Debug)]
pub(crate) struct CompiledRules {
    pub types: Vec<FieldType>,
    pub required: bool,
    pub nullable: bool,
    pub empty: bool,
    pub allowed: Option<Vec<Value>>,
    pub regex: Option<(String, Regex)>,
    pub default: Option<DefaultValue>,
    pub dependencies: Vec<Dependency>,
    pub anyof: Vec<CompiledRules>,
    pub schema: Option<NodeId>,
    pub items: Option<Box<CompiledRules>>,
    pub keysrules: Option<Box<CompiledRules>>,
    pub valuesrules: Option<Box<CompiledRules>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub minlength: Option<usize>,
    pub maxlength: Option<usize>,
}

/// A schema ready for validation
#[derive(Debug)]
pub struct CompiledSchema {
    nodes: Vec<CompiledNode>,
    root: NodeId,
}

impl CompiledSchema {
    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> &CompiledNode {
        &self.nodes[id.0]
    }

    /// Number of mapping nodes in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the root mapping declares no fields
    pub fn is_empty(&self) -> bool {
        self.node(self.root).fields.is_empty()
    }
}

struct Compiler<'r> {
    registry: &'r SchemaRegistry,
    nodes: Vec<CompiledNode>,
    /// Names bound to a slot, including those still being compiled
    named: HashMap<String, NodeId>,
}

impl<'r> Compiler<'r> {
    fn reserve(&mut self) -> NodeId {
        self.nodes.push(CompiledNode::default());
        NodeId(self.nodes.len() - 1)
    }

    fn mapping(&mut self, schema: &Schema) -> Result<NodeId, SchemaError> {
        let id = self.reserve();
        self.fill(id, schema)?;
        Ok(id)
    }

    fn named(&mut self, name: &str) -> Result<NodeId, SchemaError> {
        if let Some(id) = self.named.get(name) {
            return Ok(*id);
        }
        let schema = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::Unresolved(name.to_string()))?;
        let id = self.reserve();
        self.named.insert(name.to_string(), id);
        self.fill(id, &schema)?;
        Ok(id)
    }

    fn fill(&mut self, id: NodeId, schema: &Schema) -> Result<(), SchemaError> {
        let mut fields = IndexMap::with_capacity(schema.fields.len());
        for (name, rules) in &schema.fields {
            fields.insert(name.clone(), self.rules(rules)?);
        }
        self.nodes[id.0] = CompiledNode {
            fields,
            allow_unknown: schema.allow_unknown,
        };
        Ok(())
    }

    fn boxed(&mut self, rules: &Option<Box<Rules>>) -> Result<Option<Box<CompiledRules>>, SchemaError> {
        rules
            .as_deref()
            .map(|r| self.rules(r).map(Box::new))
            .transpose()
    }

    fn rules(&mut self, rules: &Rules) -> Result<CompiledRules, SchemaError> {
        let regex = match &rules.regex {
            Some(pattern) => {
                let anchored = format!("^(?:{})$", pattern);
                let compiled = Regex::new(&anchored).map_err(|e| SchemaError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                Some((pattern.clone(), compiled))
            }
            None => None,
        };

        let schema = match &rules.schema {
            Some(SchemaRef::Inline(nested)) => Some(self.mapping(nested)?),
            Some(SchemaRef::Named(name)) => Some(self.named(name)?),
            None => None,
        };

        let anyof = rules
            .anyof
            .iter()
            .map(|alt| self.rules(alt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledRules {
            types: rules.types.clone(),
            required: rules.required,
            nullable: rules.nullable,
            empty: rules.empty,
            allowed: rules.allowed.clone(),
            regex,
            default: rules.default.clone(),
            dependencies: rules.dependencies.clone(),
            anyof,
            schema,
            items: self.boxed(&rules.items)?,
            keysrules: self.boxed(&rules.keysrules)?,
            valuesrules: self.boxed(&rules.valuesrules)?,
            min: rules.min,
            max: rules.max,
            minlength: rules.minlength,
            maxlength: rules.maxlength,
        })
    }
}

/// Compile `schema`, resolving named references through `registry`
pub fn compile(schema: &Schema, registry: &SchemaRegistry) -> Result<CompiledSchema, SchemaError> {
    let mut compiler = Compiler {
        registry,
        nodes: Vec::new(),
        named: HashMap::new(),
    };
    let root = compiler.mapping(schema)?;
    Ok(CompiledSchema {
        nodes: compiler.nodes,
        root,
    })
}

/// Memoizes compiled schemas per schema instance
///
/// Entries are keyed by the `Arc` address and keep the source schema alive,
/// so an address cannot be reused while its entry exists. Two tasks racing on
/// the first compilation of the same schema both compile; one result wins.
#[derive(Debug, Default)]
pub struct SchemaCache {
    compiled: RwLock<HashMap<usize, (Arc<Schema>, Arc<CompiledSchema>)>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        schema: &Arc<Schema>,
        registry: &SchemaRegistry,
    ) -> Result<Arc<CompiledSchema>, SchemaError> {
        let key = Arc::as_ptr(schema) as usize;

        if let Ok(compiled) = self.compiled.read() {
            if let Some((_, hit)) = compiled.get(&key) {
                return Ok(hit.clone());
            }
        }

        let fresh = Arc::new(compile(schema, registry)?);
        let mut compiled = self
            .compiled
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (_, entry) = compiled
            .entry(key)
            .or_insert_with(|| (schema.clone(), fresh));
        Ok(entry.clone())
    }

    pub fn len(&self) -> usize {
        self.compiled.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
