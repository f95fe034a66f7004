//! Path arity and the unpacked-byte codec (spec §3, §4.1).
//!
//! A byte key is unpacked into a sequence of symbols in `[0, A)` for `A ∈ {2, 16, 256}`, and
//! packed back with an explicit padding byte so the round trip is exact.

use crate::error::CodecError;

/// A single path symbol. `A = 256` (identity unpacking) is the widest alphabet, so a symbol
/// always fits in a byte.
pub type Symbol = u8;

/// Branching factor of a trie level. Only 2, 16, and 256 are legal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Arity(u16);

impl Arity {
    pub const BINARY: Arity = Arity(2);
    pub const HEX: Arity = Arity(16);
    pub const BYTE: Arity = Arity(256);

    pub const fn value(self) -> u16 {
        self.0
    }

    /// `vector_length = A + 2` (spec §4.1).
    pub const fn vector_length(self) -> u16 {
        self.0 + 2
    }

    /// `terminal_index = A`.
    pub const fn terminal_index(self) -> u16 {
        self.0
    }

    /// `path_fragment_index = A + 1`.
    pub const fn path_fragment_index(self) -> u16 {
        self.0 + 1
    }

    /// `true` iff `0 ≤ i < A`.
    pub const fn is_child_index(self, index: u16) -> bool {
        index < self.0
    }

    fn bits_per_symbol(self) -> u32 {
        match self.0 {
            2 => 1,
            16 => 4,
            256 => 8,
            other => unreachable!("invalid arity {other} escaped validation"),
        }
    }

    fn symbols_per_byte(self) -> usize {
        (8 / self.bits_per_symbol()) as usize
    }
}

impl std::fmt::Debug for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Arity({})", self.0)
    }
}

impl TryFrom<u16> for Arity {
    type Error = CodecError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            2 | 16 | 256 => Ok(Self(value)),
            other => Err(CodecError::WrongArity(other)),
        }
    }
}

/// Splits `bytes` into symbols of the given arity. Always succeeds: every byte slice is a valid
/// (if possibly padded-looking) sequence of symbols, since there is no encode-time padding byte
/// to validate here — that only exists in [`encode`]/[`decode`].
pub fn unpack(bytes: &[u8], arity: Arity) -> Vec<Symbol> {
    match arity.value() {
        256 => bytes.to_vec(),
        16 => bytes.iter().flat_map(|&b| [b >> 4, b & 0x0F]).collect(),
        2 => bytes.iter().flat_map(|&b| (0..8).rev().map(move |i| (b >> i) & 1)).collect(),
        other => unreachable!("invalid arity {other} escaped validation"),
    }
}

fn pack_chunk(chunk: &[Symbol], arity: Arity) -> u8 {
    match arity.value() {
        256 => chunk[0],
        16 => (chunk[0] << 4) | chunk[1],
        2 => chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit),
        other => unreachable!("invalid arity {other} escaped validation"),
    }
}

fn unpack_byte(byte: u8, arity: Arity) -> Vec<Symbol> {
    match arity.value() {
        256 => vec![byte],
        16 => vec![byte >> 4, byte & 0x0F],
        2 => (0..8).rev().map(|i| (byte >> i) & 1).collect(),
        other => unreachable!("invalid arity {other} escaped validation"),
    }
}

fn validate_symbols(symbols: &[Symbol], arity: Arity) -> Result<(), CodecError> {
    let bound = arity.value();
    for &symbol in symbols {
        if u16::from(symbol) >= bound {
            return Err(match arity.value() {
                16 => CodecError::WrongNibble(symbol),
                2 => CodecError::WrongBinaryValue(symbol),
                _ => CodecError::WrongFormat(format!("symbol {symbol} out of range for arity {bound}")),
            });
        }
    }
    Ok(())
}

/// `padding_byte ‖ packed_bytes`. The padding byte records how many zero symbols were appended
/// to the tail to reach a whole byte (0 for `A = 256`, 0..1 for `A = 16`, 0..7 for `A = 2`).
pub fn encode(symbols: &[Symbol], arity: Arity) -> Result<Vec<u8>, CodecError> {
    validate_symbols(symbols, arity)?;
    let symbols_per_byte = arity.symbols_per_byte();
    let padding = (symbols_per_byte - symbols.len() % symbols_per_byte) % symbols_per_byte;

    let mut padded = Vec::with_capacity(symbols.len() + padding);
    padded.extend_from_slice(symbols);
    padded.resize(symbols.len() + padding, 0);

    let mut out = Vec::with_capacity(1 + padded.len() / symbols_per_byte);
    out.push(padding as u8);
    for chunk in padded.chunks(symbols_per_byte) {
        out.push(pack_chunk(chunk, arity));
    }
    Ok(out)
}

/// Inverse of [`encode`]. Rejects inputs whose trailing padding symbols are non-zero.
pub fn decode(bytes: &[u8], arity: Arity) -> Result<Vec<Symbol>, CodecError> {
    let symbols_per_byte = arity.symbols_per_byte();
    let (&padding_byte, packed) = bytes.split_first().ok_or(CodecError::EmptyEncoding)?;
    let padding = padding_byte as usize;
    if padding >= symbols_per_byte {
        return Err(CodecError::WrongFormat(format!(
            "padding count {padding} must be less than {symbols_per_byte} symbols per byte"
        )));
    }

    let mut symbols = Vec::with_capacity(packed.len() * symbols_per_byte);
    for &byte in packed {
        symbols.extend(unpack_byte(byte, arity));
    }

    if padding > symbols.len() {
        return Err(CodecError::WrongFormat("padding count exceeds decoded symbol count".to_string()));
    }
    let split_at = symbols.len() - padding;
    let (data, pad) = symbols.split_at(split_at);
    if pad.iter().any(|&symbol| symbol != 0) {
        return Err(match arity.value() {
            16 => CodecError::WrongNibble(*pad.iter().find(|&&s| s != 0).unwrap()),
            2 => CodecError::WrongBinaryValue(*pad.iter().find(|&&s| s != 0).unwrap()),
            _ => CodecError::WrongFormat("non-zero padding symbol".to_string()),
        });
    }
    Ok(data.to_vec())
}
