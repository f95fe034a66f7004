use std::collections::BTreeMap;

use crate::arity::Symbol;

/// The contents of a single trie node (spec §4, node invariants 1-4).
///
/// - A node exists iff `terminal.is_some() || !children.is_empty()`; [`NodeData::is_storable`]
///   is that check.
/// - `children` never holds a key for a symbol whose child does not exist — presence in the map
///   *is* existence, independent of whether the child's commitment has been recomputed yet.
/// - `path_fragment` holds every symbol consumed between this node and its parent (or the root,
///   for the root node itself); it never aliases a prefix already consumed by an ancestor.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "V: serde::Serialize + serde::de::DeserializeOwned, T: serde::Serialize + serde::de::DeserializeOwned")]
pub struct NodeData<V, T> {
    pub path_fragment: Vec<Symbol>,
    pub children: BTreeMap<Symbol, V>,
    pub terminal: Option<T>,
}

impl<V, T> NodeData<V, T> {
    pub fn empty() -> Self {
        Self { path_fragment: Vec::new(), children: BTreeMap::new(), terminal: None }
    }

    /// A node with neither a terminal nor any children has no reason to exist in the trie.
    pub fn is_storable(&self) -> bool {
        self.terminal.is_some() || !self.children.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}
