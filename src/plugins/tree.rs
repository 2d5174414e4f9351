//! Nested view of registered plugins keyed by dotted category path.
//!
//! `classification` and `preprocessing.imputation.static` become
//!
//! ```text
//! classification: [logistic]
//! preprocessing:
//!   imputation:
//!     static: [mean, constant]
//! ```
//!
//! A node holding only plugins serializes as a JSON array, any other node
//! (including an empty root) as an object. A node holding both keeps its own
//! plugins under the empty key, which registered categories never use as a
//! segment.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A category node: the values registered directly under it and its
/// sub-categories, both in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTree<T> {
    items: Vec<T>,
    children: Vec<(String, CategoryTree<T>)>,
}

impl<T> Default for CategoryTree<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl<T> CategoryTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under the dotted `path`, creating intermediate nodes.
    pub fn insert(&mut self, path: &str, value: T) {
        let mut node = self;
        for segment in path.split('.') {
            node = node.child_mut(segment);
        }
        node.items.push(value);
    }

    /// Node at the dotted `path`, if any.
    pub fn get(&self, path: &str) -> Option<&CategoryTree<T>> {
        path.split('.')
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Values registered directly at this node.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Sub-categories of this node.
    pub fn children(&self) -> impl Iterator<Item = (&str, &CategoryTree<T>)> {
        self.children.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn child(&self, segment: &str) -> Option<&CategoryTree<T>> {
        self.children
            .iter()
            .find(|(key, _)| key == segment)
            .map(|(_, node)| node)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.children.is_empty()
    }

    /// Total number of values in this node and below.
    pub fn len(&self) -> usize {
        self.items.len() + self.children.iter().map(|(_, c)| c.len()).sum::<usize>()
    }

    fn child_mut(&mut self, segment: &str) -> &mut CategoryTree<T> {
        let idx = match self.children.iter().position(|(key, _)| key == segment) {
            Some(idx) => idx,
            None => {
                self.children.push((segment.to_string(), CategoryTree::new()));
                self.children.len() - 1
            }
        };
        &mut self.children[idx].1
    }
}

impl<T: Serialize> Serialize for CategoryTree<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.children.is_empty() && !self.items.is_empty() {
            return self.items.serialize(serializer);
        }
        let own = usize::from(!self.items.is_empty());
        let mut map = serializer.serialize_map(Some(self.children.len() + own))?;
        if own == 1 {
            map.serialize_entry("", &self.items)?;
        }
        for (key, node) in &self.children {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}
