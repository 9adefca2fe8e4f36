//! 256-bit target arithmetic
//!
//! Proof-of-work targets are unsigned 256-bit integers carried on the wire in
//! the 32-bit "compact" form: one exponent byte and a three byte mantissa
//! whose top bit is a sign flag. Block hashes compare against targets as
//! little-endian integers.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uint::construct_uint;

use blast_core::Hash;

construct_uint! {
    // 4 x 64bit limbs, least significant first
    #[derive(Serialize, Deserialize)]
    pub struct U256(4);
}

/// Compact target decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompactError {
    /// Sign bit set on a non-zero mantissa
    #[error("Negative compact target: {0:#010x}")]
    Negative(u32),

    /// Value does not fit in 256 bits
    #[error("Compact target overflows 256 bits: {0:#010x}")]
    Overflow(u32),
}

/// Raw result of decoding a compact value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCompact {
    pub target: U256,
    pub negative: bool,
    pub overflow: bool,
}

/// Decode a compact value, reporting the sign and overflow flags
pub fn decode_compact(bits: u32) -> DecodedCompact {
    let size = bits >> 24;
    let word = bits & 0x007f_ffff;

    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    let target = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else if overflow {
        U256::zero()
    } else {
        U256::from(word) << (8 * (size - 3)) as usize
    };

    DecodedCompact {
        target,
        negative,
        overflow,
    }
}

/// Decode a compact target, rejecting negative and overflowing values
pub fn target_from_compact(bits: u32) -> Result<U256, CompactError> {
    let decoded = decode_compact(bits);
    if decoded.negative {
        return Err(CompactError::Negative(bits));
    }
    if decoded.overflow {
        return Err(CompactError::Overflow(bits));
    }
    Ok(decoded.target)
}

/// Encode a target in normalized compact form
pub fn compact_from_target(target: &U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*target >> (8 * (size - 3))).low_u64() as u32
    };

    // The mantissa's top bit is the sign, so move up one byte instead
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// Interpret a hash as a little-endian 256-bit integer
pub fn hash_to_u256(hash: &Hash) -> U256 {
    U256::from_little_endian(hash)
}

/// Inverse of `hash_to_u256`
pub fn u256_to_hash(value: &U256) -> Hash {
    let mut hash = [0u8; 32];
    value.to_little_endian(&mut hash);
    hash
}

/// Parse a target written in display (big-endian hex) order
pub fn u256_from_hex(s: &str) -> Result<U256, blast_util::UtilError> {
    let hash = blast_util::hash_from_hex(s)?;
    Ok(hash_to_u256(&hash))
}

/// Big-endian hex rendering of a 256-bit value
pub fn u256_to_hex(value: &U256) -> String {
    blast_util::hash_to_hex(&u256_to_hash(value))
}
