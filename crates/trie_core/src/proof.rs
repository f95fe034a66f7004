//! Succinct inclusion/absence proofs against a single root commitment (spec §4.6).

use std::collections::BTreeMap;

use crate::arity::{unpack, Arity, Symbol};
use crate::error::InvalidProof;
use crate::model::CommitmentModel;
use crate::node::NodeData;

/// How a traversal toward a key ended (spec §4.5.1). Carried on [`Proof`] so a verifier can tell,
/// without re-deriving it from the path fragments, whether the last element actually represents
/// the queried key or a key that merely diverges from it partway through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Ending {
    /// The full key was consumed exactly at the last visited node.
    Terminal,
    /// The key runs past the last visited node's path fragment into a symbol with no existing
    /// child.
    Extend,
    /// The key diverges from the last visited node's path fragment before the fragment ends.
    Split,
}

/// One step of a proof: the node's path fragment, every child commitment except the one the
/// proof descends into (the verifier reconstructs that slot from the previous step), the node's
/// terminal (if any), and which symbol the proof descended through.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "V: serde::Serialize + serde::de::DeserializeOwned, T: serde::Serialize + serde::de::DeserializeOwned")]
pub struct ProofElement<V, T> {
    pub path_fragment: Vec<Symbol>,
    pub children: BTreeMap<Symbol, V>,
    pub terminal: Option<T>,
    pub child_index: u16,
}

/// A proof that `key` does (inclusion) or does not (absence) map to some value under a root
/// commitment, without handing over the whole trie.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(bound = "V: serde::Serialize + serde::de::DeserializeOwned, T: serde::Serialize + serde::de::DeserializeOwned")]
pub struct Proof<V, T> {
    pub arity: Arity,
    pub key: Vec<Symbol>,
    pub path: Vec<ProofElement<V, T>>,
    /// How the traversal toward `key` ended. `Terminal` means the last element's `terminal`
    /// genuinely speaks to `key`; `Extend`/`Split` mean the key was never reached, so the last
    /// element's `terminal` (if any) belongs to some other, diverging key.
    pub ending: Ending,
}

/// Builds a [`ProofElement`] from a node plus the symbol the proof descended through (or the
/// sentinel `arity` for the last element, which descends nowhere).
fn proof_element<M: CommitmentModel>(
    node: &NodeData<M::Vector, M::Terminal>,
    descent_symbol: Option<Symbol>,
) -> ProofElement<M::Vector, M::Terminal> {
    let mut children = node.children.clone();
    let child_index = match descent_symbol {
        Some(symbol) => {
            children.remove(&symbol);
            symbol as u16
        }
        None => u16::MAX,
    };
    ProofElement { path_fragment: node.path_fragment.clone(), children, terminal: node.terminal.clone(), child_index }
}

impl<V, T> Proof<V, T>
where
    V: Clone + PartialEq + Eq + std::fmt::Debug,
    T: Clone + PartialEq + Eq + std::fmt::Debug,
{
    /// Verifies this proof attests to `key` mapping to `value` under `root`, using `model` to
    /// recompute commitments along the way.
    pub fn verify_with_value<M>(&self, model: &M, key: &[u8], value: &[u8], root: &Option<V>) -> Result<(), InvalidProof>
    where
        M: CommitmentModel<Vector = V, Terminal = T>,
    {
        self.verify(model, root)?;
        if self.ending != Ending::Terminal {
            return Err(InvalidProof::new("proof does not attest to the key being fully consumed"));
        }
        let last = self.path.last().ok_or_else(|| InvalidProof::new("empty proof"))?;
        let expected_terminal = model.commit_to_data(value);
        if last.terminal != expected_terminal {
            return Err(InvalidProof::new("proof's terminal does not commit to the claimed value"));
        }
        self.verify_key_matches(key)
    }

    /// Verifies this proof attests to `key`'s absence under `root`.
    pub fn verify_absence<M>(&self, model: &M, key: &[u8], root: &Option<V>) -> Result<(), InvalidProof>
    where
        M: CommitmentModel<Vector = V, Terminal = T>,
    {
        self.verify(model, root)?;
        if self.ending == Ending::Terminal {
            let last = self.path.last().ok_or_else(|| InvalidProof::new("empty proof"))?;
            if last.terminal.is_some() {
                return Err(InvalidProof::new("proof attests to a terminal where absence was claimed"));
            }
        }
        self.verify_key_matches(key)
    }

    fn verify_key_matches(&self, key: &[u8]) -> Result<(), InvalidProof> {
        let unpacked = unpack(key, self.arity);
        if unpacked != self.key {
            return Err(InvalidProof::new("proof's key does not match the key being verified"));
        }
        Ok(())
    }

    /// Structural verification: recomputes the commitment chain from the last element back to
    /// the root and checks it equals `root`. Does not inspect `key`; callers that care what the
    /// proof is *about* should use [`Proof::verify_with_value`] or [`Proof::verify_absence`].
    pub fn verify<M>(&self, model: &M, root: &Option<V>) -> Result<(), InvalidProof>
    where
        M: CommitmentModel<Vector = V, Terminal = T>,
    {
        if self.arity != model.arity() {
            return Err(InvalidProof::new("proof arity does not match the verifying model's arity"));
        }
        if self.path.is_empty() {
            return match root {
                None => Ok(()),
                Some(_) => Err(InvalidProof::new("empty proof cannot attest to a non-empty root")),
            };
        }

        let mut last_hash: Option<V> = None;
        for element in self.path.iter().rev() {
            let mut children = element.children.clone();
            if element.child_index != u16::MAX {
                if let Some(descended) = last_hash.take() {
                    children.insert(element.child_index as Symbol, descended);
                } else {
                    return Err(InvalidProof::new("interior proof element has no descended commitment to substitute"));
                }
            }
            let node = NodeData {
                path_fragment: element.path_fragment.clone(),
                children,
                terminal: element.terminal.clone(),
            };
            last_hash = model.commit_node(&node);
        }

        if model.equal_commitments(&last_hash, root) {
            Ok(())
        } else {
            Err(InvalidProof::new("recomputed root commitment does not match the claimed root"))
        }
    }
}

pub(crate) fn build_proof<M: CommitmentModel>(
    arity: Arity,
    unpacked_key: Vec<Symbol>,
    nodes_with_descent: Vec<(NodeData<M::Vector, M::Terminal>, Option<Symbol>)>,
    ending: Ending,
) -> Proof<M::Vector, M::Terminal> {
    let path = nodes_with_descent
        .iter()
        .map(|(node, descent)| proof_element::<M>(node, *descent))
        .collect();
    Proof { arity, key: unpacked_key, path, ending }
}
