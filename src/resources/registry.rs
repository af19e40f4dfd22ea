//! Resource lookup by URL slug

use crate::core::error::ResourceError;
use crate::core::resource::{ResourceDefinition, Verb};
use indexmap::IndexMap;
use std::sync::Arc;

/// Registry of the configured resources, keyed by their URL slug
///
/// An unknown slug and a verb the resource does not allow resolve to the
/// same [`ResourceError::NotFound`], so callers cannot probe which
/// resources exist.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: IndexMap<String, Arc<ResourceDefinition>>,
}

impl ResourceRegistry {
    pub fn new(resources: IndexMap<String, Arc<ResourceDefinition>>) -> Self {
        Self { resources }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceDefinition>> {
        self.resources.get(name)
    }

    /// Find a resource that answers `verb`
    pub fn resolve(&self, name: &str, verb: Verb) -> Result<&Arc<ResourceDefinition>, ResourceError> {
        match self.resources.get(name) {
            Some(resource) if resource.allows(verb) => Ok(resource),
            Some(_) => {
                tracing::debug!(resource = name, verb = %verb, "verb not allowed");
                Err(ResourceError::not_found(name))
            }
            None => Err(ResourceError::not_found(name)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDefinition>> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ResourceRegistry {
        let mut resources = IndexMap::new();
        let readonly = json!({
            "type": "list", "db": "shop", "collection": "items",
            "verbs": ["list", "read"]
        });
        resources.insert(
            "items".to_string(),
            Arc::new(ResourceDefinition::from_value("items", &readonly).unwrap()),
        );
        ResourceRegistry::new(resources)
    }

    #[test]
    fn test_resolve_collapses_unknown_and_disallowed() {
        let registry = registry();
        assert!(registry.resolve("items", Verb::List).is_ok());

        let disallowed = registry.resolve("items", Verb::Delete).unwrap_err();
        let unknown = registry.resolve("nope", Verb::List).unwrap_err();
        assert_eq!(disallowed.error_code(), unknown.error_code());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["items"]);
    }
}
