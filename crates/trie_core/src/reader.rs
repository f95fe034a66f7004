use async_trait::async_trait;

use crate::arity::{encode, Arity, Symbol};
use crate::model::CommitmentModel;
use crate::node::NodeData;
use crate::node_serde::{decode_node, NodeDecodeContext, TerminalStorageMode};
use trie_storage::KvStore;

/// Read-only access to committed trie nodes, addressed by their logical (unpacked) key.
///
/// [`crate::buffered::BufferedTrie`] layers an in-memory mutation buffer on top of any
/// `TrieReader`; a bare `StoreTrieReader` is itself a valid (if unbuffered) reader.
#[async_trait]
pub trait TrieReader<M: CommitmentModel>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get_node(&self, logical_key: &[Symbol]) -> Result<Option<NodeData<M::Vector, M::Terminal>>, Self::Error>;

    fn path_arity(&self) -> Arity;
}

/// Maps a node's logical (unpacked) key to its address in the backing [`KvStore`] by re-packing
/// it with [`encode`]. The root lives at the encoding of the empty symbol sequence, which is
/// always exactly one byte (the padding-count byte, zero).
fn store_key(logical_key: &[Symbol], arity: Arity) -> Vec<u8> {
    encode(logical_key, arity).expect("a logical key produced by this trie always belongs to its own arity")
}

/// The reference [`TrieReader`]: nodes are decoded straight out of a [`KvStore`], with terminals
/// always embedded (never taken from a value store or reconstructed from the key). Callers who
/// want the key-commitment optimization go through [`crate::buffered::BufferedTrie`], which
/// decides per-node how a terminal was stored when it wrote it.
pub struct StoreTrieReader<S, M> {
    store: S,
    model: M,
}

impl<S, M> StoreTrieReader<S, M> {
    pub fn new(store: S, model: M) -> Self {
        Self { store, model }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn model(&self) -> &M
    where
        M: CommitmentModel,
    {
        &self.model
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[async_trait]
impl<S, M> TrieReader<M> for StoreTrieReader<S, M>
where
    S: KvStore,
    M: CommitmentModel,
{
    type Error = crate::error::TrieAccessError<S::Error>;

    async fn get_node(&self, logical_key: &[Symbol]) -> Result<Option<NodeData<M::Vector, M::Terminal>>, Self::Error> {
        let key = store_key(logical_key, self.model.arity());
        let Some(bytes) = self.store.get(&key).await.map_err(crate::error::TrieAccessError::Store)? else {
            return Ok(None);
        };
        let ctx = NodeDecodeContext { logical_key };
        let node = decode_node(&self.model, &bytes, &ctx)?;
        Ok(Some(node))
    }

    fn path_arity(&self) -> Arity {
        self.model.arity()
    }
}

/// Persists a single node under its logical key, choosing [`TerminalStorageMode`] the same way
/// [`crate::buffered::BufferedTrie::persist_mutations`] does: embed unless the key-commitment
/// optimization applies.
pub(crate) fn encode_for_store<M: CommitmentModel>(
    model: &M,
    node: &NodeData<M::Vector, M::Terminal>,
    terminal_mode: TerminalStorageMode,
) -> Vec<u8> {
    crate::node_serde::encode_node(model, node, terminal_mode)
        .expect("a node produced by BufferedTrie always encodes under its own model")
}

pub(crate) fn node_store_key(logical_key: &[Symbol], arity: Arity) -> Vec<u8> {
    store_key(logical_key, arity)
}
