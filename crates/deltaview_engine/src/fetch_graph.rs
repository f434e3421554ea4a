//! Fetch graphs.
//!
//! A fetch graph describes which nested relations must be loaded before a
//! flush can proceed. Different subsets of dirty attributes produce
//! differently shaped graphs; `merge_with` unions them into one superset
//! graph that is reused as a cache key. Nodes are immutable — merging always
//! produces a new tree.

use crate::error::{FlushError, FlushResult};
use std::collections::{BTreeMap, BTreeSet};

/// One node of a fetch graph, keyed by attribute name.
///
/// Children and fetch paths are kept in ordered containers so that two
/// graphs describing the same fetches are structurally equal, which makes
/// merging associative and idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchGraphNode {
    attribute: String,
    fetches: BTreeSet<String>,
    children: BTreeMap<String, FetchGraphNode>,
}

impl FetchGraphNode {
    /// Creates a node for an attribute with no fetches.
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            fetches: BTreeSet::new(),
            children: BTreeMap::new(),
        }
    }

    /// Creates a node for an attribute with the given fetch paths.
    #[must_use]
    pub fn with_fetches<I, S>(attribute: impl Into<String>, fetches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute: attribute.into(),
            fetches: fetches.into_iter().map(Into::into).collect(),
            children: BTreeMap::new(),
        }
    }

    /// Adds a fetch path, consuming and returning the node.
    #[must_use]
    pub fn fetch(mut self, path: impl Into<String>) -> Self {
        self.fetches.insert(path.into());
        self
    }

    /// Adds a child node, consuming and returning the node.
    #[must_use]
    pub fn child(mut self, node: FetchGraphNode) -> Self {
        self.children.insert(node.attribute.clone(), node);
        self
    }

    /// Returns the attribute name this node describes.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns the fetch paths of this node.
    #[must_use]
    pub fn fetches(&self) -> &BTreeSet<String> {
        &self.fetches
    }

    /// Returns the child node for an attribute, if present.
    #[must_use]
    pub fn child_node(&self, attribute: &str) -> Option<&FetchGraphNode> {
        self.children.get(attribute)
    }

    /// Merges this node with another describing the same attribute,
    /// producing a new superset node.
    ///
    /// Merging is associative and idempotent: merging a graph with itself
    /// yields an equal graph.
    pub fn merge_with(&self, other: &FetchGraphNode) -> FlushResult<FetchGraphNode> {
        if self.attribute != other.attribute {
            return Err(FlushError::unsupported(format!(
                "cannot merge fetch graph for attribute {} with {}",
                self.attribute, other.attribute
            )));
        }
        let mut merged = self.clone();
        merged.fetches.extend(other.fetches.iter().cloned());
        for (name, child) in &other.children {
            match merged.children.get(name) {
                Some(existing) => {
                    let merged_child = existing.merge_with(child)?;
                    merged.children.insert(name.clone(), merged_child);
                }
                None => {
                    merged.children.insert(name.clone(), child.clone());
                }
            }
        }
        Ok(merged)
    }

    /// Merges an iterator of nodes describing the same attribute.
    ///
    /// Returns `None` for an empty iterator.
    pub fn merge_all<'a, I>(nodes: I) -> FlushResult<Option<FetchGraphNode>>
    where
        I: IntoIterator<Item = &'a FetchGraphNode>,
    {
        let mut merged: Option<FetchGraphNode> = None;
        for node in nodes {
            merged = Some(match merged {
                Some(acc) => acc.merge_with(node)?,
                None => node.clone(),
            });
        }
        Ok(merged)
    }

    /// Returns whether this graph covers `required`: same attribute, every
    /// fetch path present, every child covered recursively.
    ///
    /// A flush may only proceed when the graph loaded for a view covers the
    /// graph its dirty attributes require.
    #[must_use]
    pub fn is_superset_of(&self, required: &FetchGraphNode) -> bool {
        self.attribute == required.attribute
            && required.fetches.is_subset(&self.fetches)
            && required.children.iter().all(|(name, child)| {
                self.children
                    .get(name)
                    .map(|own| own.is_superset_of(child))
                    .unwrap_or(false)
            })
    }

    /// Appends this node's fetch-join paths under `base` to `out`, in
    /// canonical order.
    pub fn append_fetch_fragment(&self, base: &str, out: &mut Vec<String>) {
        let prefix = if base.is_empty() {
            self.attribute.clone()
        } else if self.attribute.is_empty() {
            base.to_string()
        } else {
            format!("{base}.{}", self.attribute)
        };
        if !prefix.is_empty() {
            out.push(prefix.clone());
        }
        for fetch in &self.fetches {
            out.push(format!("{prefix}.{fetch}"));
        }
        for child in self.children.values() {
            child.append_fetch_fragment(&prefix, out);
        }
    }

    /// Renders the full fetch fragment as a sorted path list.
    #[must_use]
    pub fn fetch_paths(&self, base: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.append_fetch_fragment(base, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_a() -> FetchGraphNode {
        FetchGraphNode::new("author").fetch("name")
    }

    fn node_b() -> FetchGraphNode {
        FetchGraphNode::new("author")
            .fetch("email")
            .child(FetchGraphNode::new("address").fetch("city"))
    }

    fn node_c() -> FetchGraphNode {
        FetchGraphNode::new("author")
            .fetch("name")
            .child(FetchGraphNode::new("address").fetch("zip"))
    }

    #[test]
    fn merge_unions_fetches_and_children() {
        let merged = node_a().merge_with(&node_b()).unwrap();
        assert!(merged.fetches().contains("name"));
        assert!(merged.fetches().contains("email"));
        assert!(merged.child_node("address").is_some());
    }

    #[test]
    fn merge_is_idempotent() {
        let node = node_b();
        let merged = node.merge_with(&node).unwrap();
        assert_eq!(merged, node);
    }

    #[test]
    fn merge_is_associative() {
        let left = node_a()
            .merge_with(&node_b())
            .unwrap()
            .merge_with(&node_c())
            .unwrap();
        let right = node_a()
            .merge_with(&node_b().merge_with(&node_c()).unwrap())
            .unwrap();
        assert_eq!(left, right);
        assert_eq!(left.fetch_paths(""), right.fetch_paths(""));
    }

    #[test]
    fn merge_of_different_attributes_is_rejected() {
        let a = FetchGraphNode::new("author");
        let b = FetchGraphNode::new("comments");
        assert!(a.merge_with(&b).is_err());
    }

    #[test]
    fn fetch_fragment_is_canonical() {
        let merged = node_b().merge_with(&node_c()).unwrap();
        let paths = merged.fetch_paths("");
        assert_eq!(
            paths,
            vec![
                "author",
                "author.email",
                "author.name",
                "author.address",
                "author.address.city",
                "author.address.zip",
            ]
        );
    }

    #[test]
    fn merged_graph_is_a_superset_of_its_inputs() {
        let merged = node_b().merge_with(&node_c()).unwrap();
        assert!(merged.is_superset_of(&node_b()));
        assert!(merged.is_superset_of(&node_c()));
        assert!(!node_b().is_superset_of(&merged));
    }

    #[test]
    fn superset_check_descends_into_children() {
        let loaded = node_b();
        let required = FetchGraphNode::new("author")
            .child(FetchGraphNode::new("address").fetch("zip"));
        assert!(!loaded.is_superset_of(&required));
        let required = FetchGraphNode::new("author")
            .child(FetchGraphNode::new("address").fetch("city"));
        assert!(loaded.is_superset_of(&required));
    }

    #[test]
    fn merge_all_of_empty_iterator_is_none() {
        let merged = FetchGraphNode::merge_all(std::iter::empty()).unwrap();
        assert!(merged.is_none());
    }
}
