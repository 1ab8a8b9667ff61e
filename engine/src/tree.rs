//! Ordered, name-keyed child sets and the merge rule shared by every folder level.
//!
//! Inserting a child whose name is already taken either merges it into the
//! existing "twin" (identical attributes) or fails with a conflict naming
//! every differing attribute. Attributes are compared over a fixed field set
//! declared by each node type through [`Node`].

use crate::error::{EngineError, FieldDifference, Result};
use std::collections::HashMap;

/// A node that can live in a [`ChildSet`].
pub trait Node {
    /// Level name used in reports
    const KIND: &'static str;

    fn name(&self) -> &str;

    /// Non-child attributes as (field, rendered value), in declaration order.
    fn attribute_fields(&self) -> Vec<(&'static str, String)>;

    /// Equality over the non-child attributes only.
    fn same_attributes(&self, other: &Self) -> bool;

    /// Merge the children of an identical twin into this node.
    fn absorb(&mut self, twin: Self) -> Result<()>;
}

/// Children of a folder, in insertion order, unique by name.
#[derive(Debug, Clone)]
pub struct ChildSet<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for ChildSet<T> {
    fn default() -> Self {
        ChildSet {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Node> ChildSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `child` under the folder named `parent`.
    ///
    /// # Errors
    /// Returns EngineError::ChildConflict if a same-named child with different
    /// attributes is already present
    pub fn insert(&mut self, parent: &str, child: T) -> Result<()> {
        if let Some(&idx) = self.index.get(child.name()) {
            let existing = &mut self.items[idx];
            if !existing.same_attributes(&child) {
                return Err(conflict(parent, existing, &child));
            }
            tracing::trace!(kind = T::KIND, name = child.name(), parent, "merging into twin");
            return existing.absorb(child);
        }

        tracing::trace!(kind = T::KIND, name = child.name(), parent, "adding child");
        self.index.insert(child.name().to_string(), self.items.len());
        self.items.push(child);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&idx| &self.items[idx])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Mutable access for path assignment; names must not change.
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> IntoIterator for ChildSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

fn conflict<T: Node>(parent: &str, existing: &T, incoming: &T) -> EngineError {
    let differences = existing
        .attribute_fields()
        .into_iter()
        .zip(incoming.attribute_fields())
        .filter(|((_, old), (_, new))| old != new)
        .map(|((field, old), (_, new))| FieldDifference {
            field,
            existing: old,
            incoming: new,
        })
        .collect();

    EngineError::ChildConflict {
        kind: T::KIND,
        name: existing.name().to_string(),
        parent: parent.to_string(),
        differences,
    }
}
