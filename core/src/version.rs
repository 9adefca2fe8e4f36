//! Block version field layout
//!
//! The 32-bit header version multiplexes four things:
//!
//! ```text
//!  31..29      28..16          15..9   8         7..0
//! [top bits ] [chain ID      ] [    ] [auxpow ] [base version]
//! ```
//!
//! The top three bits are reserved for version-bits signaling and are masked
//! out before the chain ID is extracted. All helpers here are total functions
//! of the raw version.

/// Flag set on headers that carry an auxiliary proof-of-work
pub const BLOCK_VERSION_AUXPOW: i32 = 1 << 8;

/// Multiplier placing the chain ID above the auxpow flag
pub const BLOCK_VERSION_CHAIN_START: i32 = 1 << 16;

/// Largest chain ID that fits between the auxpow flag and the top bits
pub const MAX_CHAIN_ID: i32 = 0x1fff;

/// Bits reserved for version-bits soft-fork signaling
pub const VERSIONBITS_TOP_MASK: i32 = 0xE000_0000u32 as i32;

/// Value of the masked top bits on a version-bits signaling header
pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;

/// Total number of deployment bits available
pub const VERSIONBITS_NUM_BITS: u8 = 29;

/// Base version, without auxpow flag or chain ID
pub fn base_version(version: i32) -> i32 {
    version % BLOCK_VERSION_AUXPOW
}

/// Merge-mining chain ID encoded in the version
pub fn chain_id(version: i32) -> i32 {
    (version & !VERSIONBITS_TOP_MASK) / BLOCK_VERSION_CHAIN_START
}

/// Whether the auxpow flag is set
pub fn is_auxpow(version: i32) -> bool {
    version & BLOCK_VERSION_AUXPOW != 0
}

/// Whether this is a legacy version 1 header with no chain ID semantics
pub fn is_legacy(version: i32) -> bool {
    version == 1
}

/// Whether `chain_id` fits in the chain ID bits
pub fn is_valid_chain_id(chain_id: i32) -> bool {
    (0..=MAX_CHAIN_ID).contains(&chain_id)
}

/// Replace only the chain ID bits.
///
/// The top bits, the auxpow flag and the base version are preserved. Callers
/// must pass a chain ID accepted by `is_valid_chain_id`.
pub fn with_chain_id(version: i32, chain_id: i32) -> i32 {
    debug_assert!(is_valid_chain_id(chain_id), "chain ID {:#x} out of range", chain_id);
    let preserved = version & (VERSIONBITS_TOP_MASK | (BLOCK_VERSION_CHAIN_START - 1));
    preserved | ((chain_id & MAX_CHAIN_ID) * BLOCK_VERSION_CHAIN_START)
}

/// Set or clear the auxpow flag
pub fn with_auxpow_flag(version: i32, auxpow: bool) -> i32 {
    if auxpow {
        version | BLOCK_VERSION_AUXPOW
    } else {
        version & !BLOCK_VERSION_AUXPOW
    }
}

/// Compose a fresh version from a base version and a chain ID
pub fn compose(base_version: i32, chain_id: i32) -> i32 {
    debug_assert!(is_valid_chain_id(chain_id), "chain ID {:#x} out of range", chain_id);
    base_version | ((chain_id & MAX_CHAIN_ID) * BLOCK_VERSION_CHAIN_START)
}

/// Whether `version` signals readiness for deployment `bit`
pub fn signals_bit(version: i32, bit: u8) -> bool {
    bit < VERSIONBITS_NUM_BITS
        && (version & VERSIONBITS_TOP_MASK) == VERSIONBITS_TOP_BITS
        && (version >> bit) & 1 == 1
}
