//! The reference commitment model: a keyed Blake2s hash over each node's `A + 2` slots (spec
//! §4.2, "reference hash model"). Every model-defined byte encoding a consumer needs to persist
//! nodes or verify proofs lives here; `trie_core` ships this one so the crate is usable without a
//! caller supplying their own commitment scheme.

use blake2::Blake2s256;
use digest::Digest;

use crate::arity::{encode, Arity, Symbol};
use crate::error::CodecError;
use crate::model::CommitmentModel;
use crate::node::NodeData;

pub const HASH_WIDTH: usize = 32;

const DEFAULT_DOMAIN: &[u8] = b"trie_core/hash-model/v1";

const EXPENSIVE_FLAG: u8 = 0b1000_0000;
const RESERVED_FLAG: u8 = 0b0100_0000;
const LENGTH_MASK: u8 = 0b0011_1111;

/// A 32-byte Blake2s digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct HashOutput(#[serde(with = "serde_bytes_array")] pub [u8; HASH_WIDTH]);

impl std::fmt::Debug for HashOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashOutput({})", hex::encode(self.0))
    }
}

/// A terminal commitment under the reference model: either the raw value (when it fits in
/// [`HASH_WIDTH`] bytes) or the hash of the value (when it doesn't).
#[derive(Clone, PartialEq, Eq, Default, Debug, serde::Serialize, serde::Deserialize)]
pub struct HashTerminal {
    /// Raw value bytes if `!expensive`, else `H(value)`.
    pub bytes: Vec<u8>,
    pub expensive: bool,
}

mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; super::HASH_WIDTH], serializer: S) -> Result<S::Ok, S::Error> {
        bytes.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; super::HASH_WIDTH], D::Error> {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        vec.try_into().map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

/// The reference Blake2s-based [`CommitmentModel`].
///
/// `domain_key` is prepended to every hash input, standing in for the "keyed hash" the spec
/// expects a commitment model to apply so that commitments from unrelated deployments never
/// collide by construction.
#[derive(Clone, Debug)]
pub struct HashModel {
    arity: Arity,
    domain_key: Vec<u8>,
}

impl HashModel {
    pub fn new(arity: Arity) -> Self {
        Self { arity, domain_key: DEFAULT_DOMAIN.to_vec() }
    }

    pub fn with_domain_key(arity: Arity, domain_key: impl Into<Vec<u8>>) -> Self {
        Self { arity, domain_key: domain_key.into() }
    }

    fn hash(&self, data: &[u8]) -> [u8; HASH_WIDTH] {
        let mut hasher = Blake2s256::new();
        hasher.update(&self.domain_key);
        hasher.update(data);
        hasher.finalize().into()
    }

    fn pad_to_width(bytes: &[u8]) -> [u8; HASH_WIDTH] {
        let mut out = [0u8; HASH_WIDTH];
        out[..bytes.len()].copy_from_slice(bytes);
        out
    }
}

impl CommitmentModel for HashModel {
    type Vector = HashOutput;
    type Terminal = HashTerminal;

    fn arity(&self) -> Arity {
        self.arity
    }

    fn commit_to_data(&self, data: &[u8]) -> Option<Self::Terminal> {
        if data.is_empty() {
            return None;
        }
        if data.len() <= HASH_WIDTH {
            Some(HashTerminal { bytes: data.to_vec(), expensive: false })
        } else {
            Some(HashTerminal { bytes: self.hash(data).to_vec(), expensive: true })
        }
    }

    fn commit_node(&self, node: &NodeData<Self::Vector, Self::Terminal>) -> Option<Self::Vector> {
        if !node.is_storable() {
            return None;
        }

        let arity_value = self.arity.value() as usize;
        let mut buf = Vec::with_capacity((arity_value + 2) * HASH_WIDTH);

        for symbol in 0..arity_value {
            let slot = match node.children.get(&(symbol as Symbol)) {
                Some(commitment) => self.hash(&commitment.0),
                None => [0u8; HASH_WIDTH],
            };
            buf.extend_from_slice(&slot);
        }

        let terminal_slot = match &node.terminal {
            Some(terminal) => Self::pad_to_width(&terminal.bytes),
            None => [0u8; HASH_WIDTH],
        };
        buf.extend_from_slice(&terminal_slot);

        let encoded_fragment =
            encode(&node.path_fragment, self.arity).expect("a node's own path fragment always belongs to its own arity");
        buf.extend_from_slice(&self.hash(&encoded_fragment));

        Some(HashOutput(self.hash(&buf)))
    }

    fn force_store_terminal_with_node(&self, terminal: &Self::Terminal) -> bool {
        terminal.expensive
    }

    fn encode_vector(&self, vector: &Self::Vector) -> Vec<u8> {
        vector.0.to_vec()
    }

    fn decode_vector(&self, bytes: &[u8]) -> Result<(Self::Vector, usize), CodecError> {
        let slice = bytes
            .get(..HASH_WIDTH)
            .ok_or_else(|| CodecError::WrongFormat("truncated vector commitment".to_string()))?;
        let mut array = [0u8; HASH_WIDTH];
        array.copy_from_slice(slice);
        Ok((HashOutput(array), HASH_WIDTH))
    }

    fn encode_terminal(&self, terminal: &Self::Terminal) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + terminal.bytes.len());
        let flag = if terminal.expensive { EXPENSIVE_FLAG } else { 0 };
        out.push(flag | (terminal.bytes.len() as u8 & LENGTH_MASK));
        out.extend_from_slice(&terminal.bytes);
        out
    }

    fn decode_terminal(&self, bytes: &[u8]) -> Result<(Self::Terminal, usize), CodecError> {
        let &header = bytes.first().ok_or(CodecError::EmptyEncoding)?;
        if header & RESERVED_FLAG != 0 {
            return Err(CodecError::WrongFormat("reserved terminal-length bit is set".to_string()));
        }
        let expensive = header & EXPENSIVE_FLAG != 0;
        let len = (header & LENGTH_MASK) as usize;
        let value =
            bytes.get(1..1 + len).ok_or_else(|| CodecError::WrongFormat("truncated terminal commitment".to_string()))?;
        Ok((HashTerminal { bytes: value.to_vec(), expensive }, 1 + len))
    }

    fn short_name(&self) -> &'static str {
        "blake2s-hash-model"
    }

    fn description(&self) -> &'static str {
        "domain-separated Blake2s-256 over each node's children, terminal and path fragment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn model() -> HashModel {
        HashModel::new(Arity::HEX)
    }

    #[test]
    fn empty_node_has_no_commitment() {
        let node: NodeData<HashOutput, HashTerminal> = NodeData::empty();
        assert_eq!(model().commit_node(&node), None);
    }

    #[test]
    fn commit_to_data_is_absent_for_empty_input() {
        assert_eq!(model().commit_to_data(&[]), None);
    }

    #[test]
    fn commit_to_data_embeds_short_values() {
        let terminal = model().commit_to_data(b"short").unwrap();
        assert!(!terminal.expensive);
        assert_eq!(terminal.bytes, b"short");
    }

    #[test]
    fn commit_to_data_hashes_long_values() {
        let long_value = vec![7u8; HASH_WIDTH + 1];
        let terminal = model().commit_to_data(&long_value).unwrap();
        assert!(terminal.expensive);
        assert_eq!(terminal.bytes.len(), HASH_WIDTH);
    }

    #[test]
    fn commit_node_is_order_independent_over_child_insertion() {
        let m = model();
        let leaf_commitment = m.commit_to_data(b"v").unwrap();
        let mut children_a = BTreeMap::new();
        children_a.insert(1u8, HashOutput([1u8; HASH_WIDTH]));
        children_a.insert(2u8, HashOutput([2u8; HASH_WIDTH]));
        let mut children_b = BTreeMap::new();
        children_b.insert(2u8, HashOutput([2u8; HASH_WIDTH]));
        children_b.insert(1u8, HashOutput([1u8; HASH_WIDTH]));

        let node_a = NodeData { path_fragment: vec![], children: children_a, terminal: Some(leaf_commitment.clone()) };
        let node_b = NodeData { path_fragment: vec![], children: children_b, terminal: Some(leaf_commitment) };
        assert_eq!(m.commit_node(&node_a), m.commit_node(&node_b));
    }

    #[test]
    fn different_path_fragments_yield_different_commitments() {
        let m = model();
        let terminal = m.commit_to_data(b"v").unwrap();
        let node_a = NodeData { path_fragment: vec![1, 2], children: BTreeMap::new(), terminal: Some(terminal.clone()) };
        let node_b = NodeData { path_fragment: vec![1, 3], children: BTreeMap::new(), terminal: Some(terminal) };
        assert_ne!(m.commit_node(&node_a), m.commit_node(&node_b));
    }

    #[test]
    fn vector_and_terminal_encodings_round_trip() {
        let m = model();
        let vector = HashOutput([9u8; HASH_WIDTH]);
        let encoded = m.encode_vector(&vector);
        let (decoded, consumed) = m.decode_vector(&encoded).unwrap();
        assert_eq!(decoded, vector);
        assert_eq!(consumed, HASH_WIDTH);

        for terminal in [
            HashTerminal { bytes: b"hi".to_vec(), expensive: false },
            HashTerminal { bytes: vec![3u8; HASH_WIDTH], expensive: true },
        ] {
            let encoded = m.encode_terminal(&terminal);
            let (decoded, consumed) = m.decode_terminal(&encoded).unwrap();
            assert_eq!(decoded, terminal);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn different_domain_keys_yield_different_commitments() {
        let a = HashModel::with_domain_key(Arity::HEX, b"domain-a".to_vec());
        let b = HashModel::with_domain_key(Arity::HEX, b"domain-b".to_vec());
        assert_ne!(a.commit_to_data(b"same value"), b.commit_to_data(b"same value"));
    }

    #[test]
    fn empty_vector_and_terminal_are_defaulted() {
        let m = model();
        assert_eq!(m.new_empty_vector(), HashOutput::default());
        assert_eq!(m.new_empty_terminal(), HashTerminal::default());
    }

    #[test]
    fn description_is_non_empty_and_distinct_from_short_name() {
        let m = model();
        assert!(!m.description().is_empty());
        assert_ne!(m.description(), m.short_name());
    }
}
