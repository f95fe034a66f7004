use thiserror::Error;

/// Failures in the unpacked-byte codec and the node byte format (spec §4.1, §4.3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("arity must be one of 2, 16, 256; got {0}")]
    WrongArity(u16),

    #[error("nibble out of range for the 16-ary alphabet: {0}")]
    WrongNibble(u8),

    #[error("bit out of range for the binary alphabet: {0}")]
    WrongBinaryValue(u8),

    #[error("cannot decode an empty byte buffer")]
    EmptyEncoding,

    #[error("malformed encoding: {0}")]
    WrongFormat(String),

    #[error("trailing bytes left over after decoding")]
    NotAllBytesConsumed,
}

/// A proof failed verification. Carries a human-readable reason; verification never panics on
/// attacker-controlled input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid proof: {reason}")]
pub struct InvalidProof {
    pub reason: String,
}

impl InvalidProof {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Error surface for any trie operation that may read through to the backing store.
///
/// `Codec` covers malformed bytes encountered while decoding a node that the store handed back;
/// `Store` is the backing [`crate::storage::KvStore`]'s own error, propagated unchanged.
#[derive(Debug, Error)]
pub enum TrieAccessError<E: std::error::Error + 'static> {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(E),
}
