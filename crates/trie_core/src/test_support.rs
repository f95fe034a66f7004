//! Random fixture generators, in the style of a `DummyRandomValue`-shaped test-data builder:
//! every fixture type knows how to produce an arbitrary instance of itself from an [`Rng`], so
//! property tests can sample many small tries instead of hand-writing each one.

use rand::Rng;
use strum_macros::{EnumDiscriminants, EnumIter};

use crate::arity::Arity;

/// Produces an arbitrary value of `Self` for property-style tests.
pub trait RandomValue {
    fn random<R: Rng>(rng: &mut R) -> Self;
}

impl RandomValue for Arity {
    fn random<R: Rng>(rng: &mut R) -> Self {
        *[Arity::BINARY, Arity::HEX, Arity::BYTE].get(rng.gen_range(0..3)).unwrap()
    }
}

/// A randomly generated byte key/value pair, with the length kept small enough that generated
/// tries stay cheap to commit in a test loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RandomEntry {
    pub fn random<R: Rng>(rng: &mut R, max_len: usize) -> Self {
        let key_len = rng.gen_range(1..=max_len.max(1));
        let value_len = rng.gen_range(1..=max_len.max(1));
        Self {
            key: (0..key_len).map(|_| rng.gen::<u8>()).collect(),
            value: (0..value_len).map(|_| rng.gen::<u8>()).collect(),
        }
    }
}

/// Distinct ways to perturb a set of entries, used by the randomized reorg tests to exercise
/// every [`crate::buffered::Ending`]/reorg path without hand-enumerating them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumDiscriminants)]
#[strum_discriminants(name(PerturbationKind), derive(EnumIter))]
pub enum Perturbation {
    InsertNew,
    OverwriteExisting,
    DeleteExisting,
    DeleteMissing,
}

impl Perturbation {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        use strum::IntoEnumIterator;
        let kinds: Vec<PerturbationKind> = PerturbationKind::iter().collect();
        match kinds[rng.gen_range(0..kinds.len())] {
            PerturbationKind::InsertNew => Perturbation::InsertNew,
            PerturbationKind::OverwriteExisting => Perturbation::OverwriteExisting,
            PerturbationKind::DeleteExisting => Perturbation::DeleteExisting,
            PerturbationKind::DeleteMissing => Perturbation::DeleteMissing,
        }
    }
}

/// Generates `count` distinct random keys of up to `max_len` bytes.
pub fn random_distinct_entries<R: Rng>(rng: &mut R, count: usize, max_len: usize) -> Vec<RandomEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let entry = RandomEntry::random(rng, max_len);
        if seen.insert(entry.key.clone()) {
            out.push(entry);
        }
    }
    out
}
