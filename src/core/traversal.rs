//! Document traversal
//!
//! [`traverse`] walks a fetched document along resolved [`AccessStep`]s and
//! returns the addressed value together with a [`WriteBack`]: the owning
//! collection, the full root document and the chain of keys leading to the
//! addressed slot. Writing through it mutates the root in memory and then
//! replaces the whole root document in the store. A nested write is never a
//! partial field update, since the path may cross lists and maps that a
//! field-path update syntax cannot express generically.
//!
//! Concurrent nested writes to the same root are not isolated: the last
//! whole-document replace wins.

use crate::core::path::{AccessStep, Subscript};
use crate::core::projection::Projection;
use crate::core::store::{CollectionRef, DocumentStore};
use anyhow::{Result, anyhow};
use serde_json::{Value, json};

/// One hop from a container to a child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKey {
    Field(String),
    Index(usize),
}

impl PathKey {
    fn get<'a>(&self, container: &'a Value) -> Option<&'a Value> {
        match self {
            PathKey::Field(name) => container.as_object()?.get(name),
            PathKey::Index(i) => container.as_array()?.get(*i),
        }
    }

    fn get_mut<'a>(&self, container: &'a mut Value) -> Option<&'a mut Value> {
        match self {
            PathKey::Field(name) => container.as_object_mut()?.get_mut(name),
            PathKey::Index(i) => container.as_array_mut()?.get_mut(*i),
        }
    }
}

impl From<&Subscript> for PathKey {
    fn from(subscript: &Subscript) -> Self {
        match subscript {
            Subscript::Index(i) => PathKey::Index(*i),
            Subscript::Key(k) => PathKey::Field(k.clone()),
        }
    }
}

/// The result of a successful traversal
#[derive(Debug, Clone)]
pub struct Traversed {
    /// The addressed value, projected when it is a mapping
    pub value: Value,
    /// Present whenever at least one step was taken
    pub write_back: Option<WriteBack>,
}

/// Write access to the exact slot a traversal read from
#[derive(Debug, Clone)]
pub struct WriteBack {
    target: CollectionRef,
    root: Value,
    location: Vec<PathKey>,
}

impl WriteBack {
    /// Keys from the root to the addressed slot
    pub fn location(&self) -> &[PathKey] {
        &self.location
    }

    /// The (possibly already mutated) root document
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Mutable access to the root, for normalizing it before [`persist`](Self::persist)
    ///
    /// `_id` must be left in place.
    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    /// The current, unprojected value at the addressed slot
    pub fn current(&self) -> Option<&Value> {
        self.location
            .iter()
            .try_fold(&self.root, |node, key| key.get(node))
    }

    /// Replace the addressed slot in the in-memory root
    ///
    /// Returns `false` when the slot no longer exists.
    pub fn apply(&mut self, replacement: Value) -> bool {
        let Some((last, parents)) = self.location.split_last() else {
            return false;
        };
        let Some(parent) = parents
            .iter()
            .try_fold(&mut self.root, |node, key| key.get_mut(node))
        else {
            return false;
        };
        match last.get_mut(parent) {
            Some(slot) => {
                *slot = replacement;
                true
            }
            None => false,
        }
    }

    /// Persist the whole root document, keyed by its `_id`
    ///
    /// Returns whether a stored document was matched.
    pub async fn persist(self, store: &dyn DocumentStore) -> Result<bool> {
        let id = self
            .root
            .get("_id")
            .cloned()
            .ok_or_else(|| anyhow!("root document in {} has no _id", self.target))?;
        let matched = store
            .replace_one(&self.target, &json!({ "_id": id }), self.root)
            .await?;
        Ok(matched > 0)
    }

    /// [`apply`](Self::apply) then [`persist`](Self::persist)
    pub async fn commit(mut self, store: &dyn DocumentStore, replacement: Value) -> Result<bool> {
        if !self.apply(replacement) {
            return Ok(false);
        }
        self.persist(store).await
    }
}

/// Walk `root` along `steps`
///
/// Returns `None` when anything along the way is null, missing, out of range
/// or of the wrong container type. A null final value is found and returned
/// unprojected; a projection only applies to a mapping.
pub fn traverse(
    target: &CollectionRef,
    root: Value,
    steps: &[AccessStep],
    projection: Option<&Projection>,
) -> Option<Traversed> {
    let mut location = Vec::with_capacity(steps.len() * 2);
    let mut current = &root;

    for step in steps {
        let key = PathKey::Field(step.field.clone());
        current = key.get(current)?;
        location.push(key);

        if let Some(subscript) = &step.subscript {
            let key = PathKey::from(subscript);
            current = key.get(current)?;
            location.push(key);
        }
    }

    let value = match (current, projection) {
        (Value::Object(map), Some(projection)) => Value::Object(projection.apply(map.clone())),
        (value, _) => value.clone(),
    };

    let write_back = (!location.is_empty()).then(|| WriteBack {
        target: target.clone(),
        root,
        location,
    });

    Some(Traversed { value, write_back })
}
