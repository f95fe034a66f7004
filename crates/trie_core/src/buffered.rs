//! The mutator trie: an in-memory overlay of staged changes over a read-only [`TrieReader`]
//! (spec §4.5).
//!
//! Reads fall through the overlay to the reader on a cache miss; nothing observable through
//! [`BufferedTrie::root_commitment`] changes until [`BufferedTrie::commit`] runs, and nothing
//! reaches the backing store until [`BufferedTrie::persist_mutations`] runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_recursion::async_recursion;

use crate::arity::{encode, unpack, Arity, Symbol};
use crate::model::CommitmentModel;
use crate::node::NodeData;
use crate::node_serde::TerminalStorageMode;
use crate::reader::{node_store_key, TrieReader};
use trie_storage::KvStore;

pub use crate::proof::Ending;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reorg {
    NoOp,
    Remove,
    Merge(Symbol),
}

#[derive(Clone, Debug)]
struct BufferedNode<V, T> {
    data: NodeData<V, T>,
    new_terminal: Option<Option<T>>,
    modified_children: BTreeSet<Symbol>,
    #[allow(dead_code)] // bookkeeping kept for fidelity with the staged-mutation model; never read back.
    path_changed: bool,
}

impl<V, T> BufferedNode<V, T> {
    fn fresh(data: NodeData<V, T>) -> Self {
        Self { data, new_terminal: None, modified_children: BTreeSet::new(), path_changed: false }
    }
}

#[derive(Clone, Debug)]
enum BufferEntry<V, T> {
    Modified(BufferedNode<V, T>),
    Deleted,
}

/// Result of walking the path toward a key: every node address visited (root first), how much of
/// the last node's path fragment matched, and how the walk ended.
pub(crate) struct TraversalResult {
    pub visited: Vec<Vec<Symbol>>,
    pub common_prefix_len: usize,
    pub ending: Ending,
}

fn common_prefix_len(a: &[Symbol], b: &[Symbol]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// An in-memory mutation buffer over a [`TrieReader`], implementing insert/delete, commit,
/// persistence, proof generation, and reconciliation (spec §4.5-§4.7).
pub struct BufferedTrie<R, M: CommitmentModel> {
    reader: R,
    model: M,
    arity: Arity,
    optimize_key_commitments: bool,
    buffer: HashMap<Vec<Symbol>, BufferEntry<M::Vector, M::Terminal>>,
}

impl<R, M> BufferedTrie<R, M>
where
    M: CommitmentModel,
    R: TrieReader<M>,
{
    pub fn new(reader: R, model: M, optimize_key_commitments: bool) -> Self {
        let arity = model.arity();
        Self { reader, model, arity, optimize_key_commitments, buffer: HashMap::new() }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Drops every staged (uncommitted) change, reverting to the last committed state.
    pub fn clear_cache(&mut self) {
        self.buffer.clear();
    }

    /// The current root commitment, reflecting every committed (but not necessarily persisted)
    /// mutation. `None` iff the trie is empty.
    pub async fn root_commitment(&mut self) -> Result<Option<M::Vector>, R::Error> {
        match self.ensure_loaded(&[]).await? {
            false => Ok(None),
            true => Ok(self.model.commit_node(self.node_data(&[]))),
        }
    }

    fn node_data(&self, key: &[Symbol]) -> &NodeData<M::Vector, M::Terminal> {
        match self.buffer.get(key) {
            Some(BufferEntry::Modified(node)) => &node.data,
            other => panic!("node_data called on a key with no live buffer entry: {other:?} at {key:?}"),
        }
    }

    /// Loads the node at `key` into the buffer if it isn't already tracked there. Returns whether
    /// the node exists.
    async fn ensure_loaded(&mut self, key: &[Symbol]) -> Result<bool, R::Error> {
        if let Some(entry) = self.buffer.get(key) {
            return Ok(matches!(entry, BufferEntry::Modified(_)));
        }
        match self.reader.get_node(key).await? {
            Some(data) => {
                self.buffer.insert(key.to_vec(), BufferEntry::Modified(BufferedNode::fresh(data)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[async_recursion(?Send)]
    async fn proof_path_rec(
        &mut self,
        node_key: Vec<Symbol>,
        remaining: &[Symbol],
        mut visited: Vec<Vec<Symbol>>,
    ) -> Result<TraversalResult, R::Error> {
        visited.push(node_key.clone());
        let fragment = self.node_data(&node_key).path_fragment.clone();
        let common = common_prefix_len(&fragment, remaining);

        if common < fragment.len() {
            return Ok(TraversalResult { visited, common_prefix_len: common, ending: Ending::Split });
        }
        if common == remaining.len() {
            return Ok(TraversalResult { visited, common_prefix_len: common, ending: Ending::Terminal });
        }

        let next_symbol = remaining[common];
        let has_child = self.node_data(&node_key).children.contains_key(&next_symbol);
        if !has_child {
            return Ok(TraversalResult { visited, common_prefix_len: common, ending: Ending::Extend });
        }

        let mut child_key = node_key.clone();
        child_key.extend_from_slice(&fragment);
        child_key.push(next_symbol);
        self.ensure_loaded(&child_key).await?;
        self.proof_path_rec(child_key, &remaining[common + 1..], visited).await
    }

    /// Walks from the root toward `unpacked_key`, loading every visited node into the buffer
    /// (spec §4.5.1). An empty `visited` list means the trie is currently empty.
    pub(crate) async fn proof_path(&mut self, unpacked_key: &[Symbol]) -> Result<TraversalResult, R::Error> {
        if !self.ensure_loaded(&[]).await? {
            return Ok(TraversalResult { visited: vec![], common_prefix_len: 0, ending: Ending::Extend });
        }
        self.proof_path_rec(vec![], unpacked_key, vec![]).await
    }

    fn child_symbol(&self, parent_key: &[Symbol], unpacked_key: &[Symbol]) -> Symbol {
        let fragment_len = self.node_data(parent_key).path_fragment.len();
        unpacked_key[parent_key.len() + fragment_len]
    }

    fn mark_path_dirty(&mut self, ancestors: &[Vec<Symbol>], unpacked_key: &[Symbol]) {
        for parent_key in ancestors {
            let symbol = self.child_symbol(parent_key, unpacked_key);
            if let Some(BufferEntry::Modified(node)) = self.buffer.get_mut(parent_key) {
                node.modified_children.insert(symbol);
            }
        }
    }

    fn commit_to_data_unpacked(&self, symbols: &[Symbol]) -> Option<M::Terminal> {
        let bytes = encode(symbols, self.arity).expect("a valid unpacked symbol sequence always encodes");
        self.model.commit_to_data(&bytes)
    }

    /// Inserts or overwrites `key` with `value`. An empty `value` is equivalent to [`delete`](Self::delete).
    pub async fn update(&mut self, key: &[u8], value: &[u8]) -> Result<(), R::Error> {
        if value.is_empty() {
            return self.delete(key).await;
        }

        let unpacked_key = unpack(key, self.arity);
        let terminal = if self.optimize_key_commitments && key == value {
            self.commit_to_data_unpacked(&unpack(value, self.arity))
        } else {
            self.model.commit_to_data(value)
        };
        let terminal = terminal.expect("a non-empty value always commits to a terminal");

        let result = self.proof_path(&unpacked_key).await?;

        if result.visited.is_empty() {
            let data = NodeData { path_fragment: unpacked_key, children: BTreeMap::new(), terminal: Some(terminal) };
            self.buffer.insert(vec![], BufferEntry::Modified(BufferedNode::fresh(data)));
            return Ok(());
        }

        let last_key = result.visited.last().unwrap().clone();
        match result.ending {
            Ending::Terminal => {
                if let Some(BufferEntry::Modified(node)) = self.buffer.get_mut(&last_key) {
                    node.new_terminal = Some(Some(terminal));
                }
            }
            Ending::Extend => {
                let fragment_len = self.node_data(&last_key).path_fragment.len();
                let split_point = last_key.len() + fragment_len;
                let next_symbol = unpacked_key[split_point];
                let suffix = unpacked_key[split_point + 1..].to_vec();

                let mut child_key = last_key.clone();
                child_key.extend_from_slice(&self.node_data(&last_key).path_fragment.clone());
                child_key.push(next_symbol);
                let child_data = NodeData { path_fragment: suffix, children: BTreeMap::new(), terminal: Some(terminal) };
                self.buffer.insert(child_key, BufferEntry::Modified(BufferedNode::fresh(child_data)));

                if let Some(BufferEntry::Modified(node)) = self.buffer.get_mut(&last_key) {
                    node.data.children.insert(next_symbol, self.model.new_empty_vector());
                    node.modified_children.insert(next_symbol);
                }
            }
            Ending::Split => {
                self.split_node(&last_key, &unpacked_key, result.common_prefix_len, Some(terminal));
            }
        }

        self.mark_path_dirty(&result.visited[..result.visited.len() - 1], &unpacked_key);
        Ok(())
    }

    /// Splits the node at `node_addr` so the diverging key can be inserted (spec §4.5.3).
    fn split_node(&mut self, node_addr: &[Symbol], unpacked_key: &[Symbol], common_prefix_len: usize, terminal: Option<M::Terminal>) {
        let old = self.node_data(node_addr).clone();
        let fragment = old.path_fragment.clone();
        let p = common_prefix_len;
        let continue_symbol = fragment[p];
        let continue_suffix = fragment[p + 1..].to_vec();

        let mut common_prefix_addr = node_addr.to_vec();
        common_prefix_addr.extend_from_slice(&fragment[..p]);

        let mut continue_addr = common_prefix_addr.clone();
        continue_addr.push(continue_symbol);
        let continue_data = NodeData { path_fragment: continue_suffix, children: old.children, terminal: old.terminal };
        self.buffer.insert(continue_addr, BufferEntry::Modified(BufferedNode::fresh(continue_data)));

        let mut new_children = BTreeMap::new();
        new_children.insert(continue_symbol, self.model.new_empty_vector());

        let ends_exactly = unpacked_key.len() == node_addr.len() + p;
        let top_terminal = if ends_exactly {
            terminal
        } else {
            let branch_point = node_addr.len() + p;
            let branch_symbol = unpacked_key[branch_point];
            let extra_suffix = unpacked_key[branch_point + 1..].to_vec();
            new_children.insert(branch_symbol, self.model.new_empty_vector());

            let mut extra_addr = common_prefix_addr.clone();
            extra_addr.push(branch_symbol);
            let extra_data = NodeData { path_fragment: extra_suffix, children: BTreeMap::new(), terminal };
            self.buffer.insert(extra_addr, BufferEntry::Modified(BufferedNode::fresh(extra_data)));
            None
        };

        let mut top = BufferedNode::fresh(NodeData { path_fragment: fragment[..p].to_vec(), children: new_children, terminal: top_terminal });
        top.modified_children = top.data.children.keys().copied().collect();
        self.buffer.insert(node_addr.to_vec(), BufferEntry::Modified(top));
    }

    fn effective_terminal_present(&self, key: &[Symbol]) -> bool {
        match self.buffer.get(key) {
            Some(BufferEntry::Modified(node)) => match &node.new_terminal {
                Some(staged) => staged.is_some(),
                None => node.data.terminal.is_some(),
            },
            _ => false,
        }
    }

    fn check_reorg(&self, key: &[Symbol]) -> Reorg {
        let children = &self.node_data(key).children;
        if self.effective_terminal_present(key) || children.len() >= 2 {
            Reorg::NoOp
        } else if children.is_empty() {
            Reorg::Remove
        } else {
            Reorg::Merge(*children.keys().next().unwrap())
        }
    }

    fn drop_child(&mut self, parent_key: &[Symbol], symbol: Symbol) {
        if let Some(BufferEntry::Modified(node)) = self.buffer.get_mut(parent_key) {
            node.data.children.remove(&symbol);
            node.modified_children.insert(symbol);
        }
    }

    /// Absorbs `node_key`'s single live child into it (spec §4.5.4, the `Merge` outcome).
    async fn merge_single_child(&mut self, node_key: &[Symbol], child_symbol: Symbol) -> Result<(), R::Error> {
        let mut child_key = node_key.to_vec();
        child_key.extend_from_slice(&self.node_data(node_key).path_fragment.clone());
        child_key.push(child_symbol);
        self.ensure_loaded(&child_key).await?;
        let child_data = self.node_data(&child_key).clone();

        let mut new_fragment = self.node_data(node_key).path_fragment.clone();
        new_fragment.push(child_symbol);
        new_fragment.extend_from_slice(&child_data.path_fragment);

        let merged = NodeData { path_fragment: new_fragment, children: child_data.children, terminal: child_data.terminal };
        let mut buffered = BufferedNode::fresh(merged);
        buffered.path_changed = true;
        self.buffer.insert(node_key.to_vec(), BufferEntry::Modified(buffered));
        self.buffer.insert(child_key, BufferEntry::Deleted);
        Ok(())
    }

    /// Deletes `key` if present; a no-op otherwise (spec §4.5.4).
    pub async fn delete(&mut self, key: &[u8]) -> Result<(), R::Error> {
        let unpacked_key = unpack(key, self.arity);
        let result = self.proof_path(&unpacked_key).await?;
        if result.visited.is_empty() || result.ending != Ending::Terminal {
            return Ok(());
        }

        let mut idx = result.visited.len() - 1;
        if let Some(BufferEntry::Modified(node)) = self.buffer.get_mut(&result.visited[idx]) {
            node.new_terminal = Some(None);
        }

        loop {
            let node_key = result.visited[idx].clone();
            match self.check_reorg(&node_key) {
                Reorg::NoOp => break,
                Reorg::Remove => {
                    self.buffer.insert(node_key.clone(), BufferEntry::Deleted);
                    if idx == 0 {
                        break;
                    }
                    let parent_key = result.visited[idx - 1].clone();
                    let symbol = self.child_symbol(&parent_key, &unpacked_key);
                    self.drop_child(&parent_key, symbol);
                    idx -= 1;
                }
                Reorg::Merge(child_symbol) => {
                    self.merge_single_child(&node_key, child_symbol).await?;
                    break;
                }
            }
        }

        self.mark_path_dirty(&result.visited[..idx], &unpacked_key);
        Ok(())
    }

    /// Recursively recomputes the commitment for the node at `key`, consuming its staged
    /// changes. Purely in-memory: every node it touches was already loaded into the buffer by a
    /// prior [`proof_path`](Self::proof_path) call. Returns `None` if the node no longer exists.
    fn commit_subtree(&mut self, key: &[Symbol]) -> Option<M::Vector> {
        match self.buffer.get(key) {
            None => None,
            Some(BufferEntry::Deleted) => None,
            Some(BufferEntry::Modified(_)) => {
                let (symbols, child_base) = {
                    let node = match self.buffer.get(key).unwrap() {
                        BufferEntry::Modified(node) => node,
                        BufferEntry::Deleted => unreachable!(),
                    };
                    let symbols: Vec<Symbol> = node.modified_children.iter().copied().collect();
                    let mut base = key.to_vec();
                    base.extend_from_slice(&node.data.path_fragment);
                    (symbols, base)
                };

                let mut child_updates = Vec::with_capacity(symbols.len());
                for symbol in symbols {
                    let mut child_key = child_base.clone();
                    child_key.push(symbol);
                    let fresh = self.commit_subtree(&child_key);
                    child_updates.push((symbol, fresh));
                }

                let node = match self.buffer.get_mut(key).unwrap() {
                    BufferEntry::Modified(node) => node,
                    BufferEntry::Deleted => unreachable!(),
                };
                let new_terminal = node.new_terminal.take();
                let mut out = None;
                if child_updates.is_empty() && new_terminal.is_none() {
                    out = self.model.commit_node(&node.data);
                } else {
                    self.model.update_node_commitment(&mut node.data, &child_updates, new_terminal, &mut out);
                }
                node.modified_children.clear();
                node.path_changed = false;
                out
            }
        }
    }

    /// Recomputes every staged node's commitment, bottom-up, rooted at whatever is currently
    /// buffered at the root. Infallible: no I/O happens here, only hashing over already-loaded
    /// state (spec §4.5.5 — "the commit pipeline is infallible once inputs are validated").
    pub fn commit(&mut self) {
        self.commit_subtree(&[]);
    }

    fn terminal_matches_key(&self, key: &[Symbol], data: &NodeData<M::Vector, M::Terminal>) -> bool {
        let Some(terminal) = &data.terminal else { return false };
        let mut full_key = key.to_vec();
        full_key.extend_from_slice(&data.path_fragment);
        self.commit_to_data_unpacked(&full_key).as_ref() == Some(terminal)
    }

    /// Generates a succinct proof that `key` is present or absent, rooted at the trie's current
    /// (committed) state (spec §4.6). Whether the proof attests to inclusion or absence depends
    /// on whether the last node's terminal, once decoded, matches `key` exactly.
    pub async fn prove(&mut self, key: &[u8]) -> Result<crate::proof::Proof<M::Vector, M::Terminal>, R::Error> {
        let unpacked_key = unpack(key, self.arity);
        let result = self.proof_path(&unpacked_key).await?;

        let mut nodes_with_descent = Vec::with_capacity(result.visited.len());
        for (i, node_key) in result.visited.iter().enumerate() {
            let data = self.node_data(node_key).clone();
            let descent_symbol = if result.visited.len() > i + 1 {
                let fragment_len = data.path_fragment.len();
                Some(unpacked_key[node_key.len() + fragment_len])
            } else {
                None
            };
            nodes_with_descent.push((data, descent_symbol));
        }

        Ok(crate::proof::build_proof::<M>(self.arity, unpacked_key, nodes_with_descent, result.ending))
    }

    /// Checks `entries` against the trie's current state, returning the raw keys whose terminal
    /// does not commit to the given value (including keys missing entirely).
    pub async fn reconcile(&mut self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<Vec<Vec<u8>>, R::Error> {
        let mut mismatches = Vec::new();
        for (key, value) in entries {
            let unpacked_key = unpack(key, self.arity);
            let result = self.proof_path(&unpacked_key).await?;
            let matches = result.ending == Ending::Terminal && !result.visited.is_empty() && {
                let last_key = result.visited.last().unwrap();
                let expected = if self.optimize_key_commitments && key.as_slice() == value.as_slice() {
                    self.commit_to_data_unpacked(&unpack(value, self.arity))
                } else {
                    self.model.commit_to_data(value)
                };
                self.node_data(last_key).terminal == expected
            };
            if !matches {
                mismatches.push(key.clone());
            }
        }
        Ok(mismatches)
    }
}

impl<S, M> BufferedTrie<crate::reader::StoreTrieReader<S, M>, M>
where
    S: KvStore,
    M: CommitmentModel,
{
    /// Writes every buffered change through to the backing [`KvStore`]. Does not clear the buffer
    /// itself — [`clear_cache`](Self::clear_cache) does that — so a failure partway through leaves
    /// every not-yet-written entry intact for a retried call. Run [`commit`](Self::commit) first
    /// so commitments are up to date before they're persisted.
    pub async fn persist_mutations(&mut self) -> Result<(), S::Error> {
        let entries: Vec<(Vec<Symbol>, BufferEntry<M::Vector, M::Terminal>)> =
            self.buffer.iter().map(|(key, entry)| (key.clone(), entry.clone())).collect();
        tracing::debug!(count = entries.len(), "persisting buffered trie mutations to the backing store");
        for (key, entry) in entries {
            let store_key = node_store_key(&key, self.arity);
            match entry {
                BufferEntry::Deleted => {
                    self.reader.store_mut().delete(&store_key).await?;
                }
                BufferEntry::Modified(node) => {
                    let terminal_mode = match &node.data.terminal {
                        Some(terminal) if self.model.force_store_terminal_with_node(terminal) => TerminalStorageMode::Embedded,
                        Some(_) if self.optimize_key_commitments && self.terminal_matches_key(&key, &node.data) => {
                            TerminalStorageMode::FromKey
                        }
                        _ => TerminalStorageMode::Embedded,
                    };
                    let bytes = crate::reader::encode_for_store(&self.model, &node.data, terminal_mode);
                    self.reader.store_mut().set(store_key, bytes).await?;
                }
            }
        }
        Ok(())
    }
}
