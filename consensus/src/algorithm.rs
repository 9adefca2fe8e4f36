//! Proof-of-work algorithm selection
//!
//! BLAST switched hash functions twice, each time at a fixed timestamp per
//! network: X16R to X16RV2, then the whole light family to KAWPOW. The
//! KAWPOW switch takes precedence once reached. Both boundaries are
//! inclusive, so a header stamped exactly at an activation time already uses
//! the newer algorithm.
//!
//! The hash functions themselves are supplied through `PowHasher`, so the
//! consensus rules do not depend on any particular implementation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use blast_core::{BlockHeader, Hash, HeaderFormat, PureBlockHeader, SerializeMode};
use blast_crypto::sha256d;

use crate::params::ChainParams;

/// Blocks per KAWPOW epoch
pub const KAWPOW_EPOCH_LENGTH: u32 = 7500;

/// Hash algorithm a header's proof of work is computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowAlgorithm {
    X16r,
    X16rv2,
    Kawpow,
}

impl PowAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            PowAlgorithm::X16r => "x16r",
            PowAlgorithm::X16rv2 => "x16rv2",
            PowAlgorithm::Kawpow => "kawpow",
        }
    }

    /// Serialization the algorithm hashes
    pub fn hash_input_mode(&self) -> SerializeMode {
        match self {
            PowAlgorithm::Kawpow => SerializeMode::KawpowInput,
            PowAlgorithm::X16r | PowAlgorithm::X16rv2 => SerializeMode::Hash,
        }
    }
}

impl fmt::Display for PowAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hashing errors
#[derive(Debug, Error)]
pub enum PowError {
    /// The hasher has no implementation for this algorithm
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(PowAlgorithm),

    /// The hasher failed to produce a digest
    #[error("Hashing failed: {0}")]
    HashingFailed(String),
}

/// Select the algorithm for a header stamped `timestamp`
pub fn select_algorithm(timestamp: u32, params: &ChainParams) -> PowAlgorithm {
    if timestamp >= params.kawpow_activation_time() {
        PowAlgorithm::Kawpow
    } else if timestamp >= params.x16rv2_activation_time() {
        PowAlgorithm::X16rv2
    } else {
        PowAlgorithm::X16r
    }
}

/// KAWPOW epoch containing `height`
pub fn kawpow_epoch(height: u32) -> u32 {
    height / KAWPOW_EPOCH_LENGTH
}

/// Computes proof-of-work digests for our own headers
pub trait PowHasher: Send + Sync {
    fn pow_hash(
        &self,
        algorithm: PowAlgorithm,
        header: &BlockHeader,
        format: &HeaderFormat,
    ) -> Result<Hash, PowError>;
}

/// Computes proof-of-work digests for parent-chain headers inside an AuxPow
pub trait ParentPow: Send + Sync {
    fn parent_pow_hash(&self, header: &PureBlockHeader) -> Hash;
}

/// Double SHA256 over the algorithm's hash input.
///
/// This is the proof of work of a Bitcoin-style parent chain. For our own
/// headers it stands in for the X16R family and KAWPOW, whose
/// implementations are plugged in by the node.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256dPow;

impl PowHasher for Sha256dPow {
    fn pow_hash(
        &self,
        algorithm: PowAlgorithm,
        header: &BlockHeader,
        format: &HeaderFormat,
    ) -> Result<Hash, PowError> {
        Ok(sha256d(&header.serialize(algorithm.hash_input_mode(), format)))
    }
}

impl ParentPow for Sha256dPow {
    fn parent_pow_hash(&self, header: &PureBlockHeader) -> Hash {
        header.hash()
    }
}
