use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::arity::{Arity, Symbol};
use crate::error::CodecError;
use crate::node::NodeData;

/// A pluggable cryptographic commitment scheme (spec §4.2).
///
/// `Vector` commits to an interior node's `A + 2` slots (children, terminal, path fragment);
/// `Terminal` commits to a leaf value. Both are opaque to the trie core — it never branches on
/// their contents, only on whether one is present — so absence is always modelled as
/// `Option<Self::Vector>` / `Option<Self::Terminal>` at the call site rather than baked into the
/// type itself.
///
/// Implementations are plugged in as a concrete type parameter, not a trait object: the trie's
/// hot path (committing every touched node on every mutation) should never pay for a vtable call
/// it doesn't need.
pub trait CommitmentModel: Clone + Send + Sync {
    type Vector: Clone + Default + PartialEq + Eq + Debug + Serialize + DeserializeOwned + Send + Sync;
    type Terminal: Clone + Default + PartialEq + Eq + Debug + Serialize + DeserializeOwned + Send + Sync;

    /// The branching factor this model's vectors are sized for.
    fn arity(&self) -> Arity;

    /// A "zero" vector commitment — distinct from "absent" (`None`), which is how the trie models
    /// a child slot that has no commitment at all. Used as the placeholder installed in a parent's
    /// `children` map for a child whose own commitment has not been computed yet (it is always
    /// overwritten before `commit` returns). Defaults to [`Default::default`].
    fn new_empty_vector(&self) -> Self::Vector {
        Self::Vector::default()
    }

    /// A "zero" terminal commitment, the terminal-side counterpart to [`new_empty_vector`](Self::new_empty_vector).
    /// Defaults to [`Default::default`].
    fn new_empty_terminal(&self) -> Self::Terminal {
        Self::Terminal::default()
    }

    /// Commits to a raw value, producing a terminal commitment. `data.is_empty()` always commits
    /// to [`None`] — an empty value and a deleted key are indistinguishable by design.
    fn commit_to_data(&self, data: &[u8]) -> Option<Self::Terminal>;

    /// Commits to a node's full contents. `None` iff the node is not [`NodeData::is_storable`].
    fn commit_node(&self, node: &NodeData<Self::Vector, Self::Terminal>) -> Option<Self::Vector>;

    /// Applies a batch of child-commitment updates and (optionally) a new terminal to `node` in
    /// place, then recomputes `node`'s own commitment into `out`.
    ///
    /// `child_updates` holds one entry per child whose subtree commitment changed since the last
    /// commit; `Some(v)` installs `v`, `None` removes the slot entirely. `new_terminal`, if
    /// `Some`, replaces `node.terminal` (with `None` meaning "no longer has a terminal").
    ///
    /// The default implementation mutates then calls [`CommitmentModel::commit_node`] from
    /// scratch; models with an incremental commitment structure (e.g. a vector commitment that
    /// supports partial updates) may override this to avoid the full recomputation.
    fn update_node_commitment(
        &self,
        node: &mut NodeData<Self::Vector, Self::Terminal>,
        child_updates: &[(Symbol, Option<Self::Vector>)],
        new_terminal: Option<Option<Self::Terminal>>,
        out: &mut Option<Self::Vector>,
    ) {
        for (symbol, commitment) in child_updates {
            match commitment {
                Some(value) => {
                    node.children.insert(*symbol, value.clone());
                }
                None => {
                    node.children.remove(symbol);
                }
            }
        }
        if let Some(terminal) = new_terminal {
            node.terminal = terminal;
        }
        *out = self.commit_node(node);
    }

    /// Equality of two vector commitments. Defaults to `PartialEq`; overridable for models whose
    /// commitment has multiple valid byte representations of the same logical value.
    fn equal_commitments(&self, a: &Option<Self::Vector>, b: &Option<Self::Vector>) -> bool {
        a == b
    }

    /// `true` if `terminal` is large enough that the model prefers it stored alongside the node
    /// rather than recomputed from an external value store or from the key itself.
    fn force_store_terminal_with_node(&self, _terminal: &Self::Terminal) -> bool {
        false
    }

    /// Model-defined fixed-width encoding for a vector commitment, used by the node byte format.
    /// Returns the commitment plus the number of bytes consumed.
    fn encode_vector(&self, vector: &Self::Vector) -> Vec<u8>;
    fn decode_vector(&self, bytes: &[u8]) -> Result<(Self::Vector, usize), CodecError>;

    /// Model-defined encoding for an embedded terminal commitment.
    fn encode_terminal(&self, terminal: &Self::Terminal) -> Vec<u8>;
    fn decode_terminal(&self, bytes: &[u8]) -> Result<(Self::Terminal, usize), CodecError>;

    /// Short machine-readable identifier, used in diagnostics and test fixture labels.
    fn short_name(&self) -> &'static str;

    /// Longer human-readable description of the commitment scheme, surfaced in diagnostics
    /// (e.g. error context, CLI introspection) where `short_name` would be too terse.
    fn description(&self) -> &'static str;
}
