//! BLAST Consensus Engine
//!
//! This crate implements the consensus rules for BLAST headers: per-network
//! chain parameters, time-based proof-of-work algorithm selection, merged
//! mining (AuxPow) verification, interval difficulty retargeting and
//! version-bits deployment tracking.
//!
//! Every rule takes `&ChainParams` explicitly. Parameters and block index
//! entries are immutable, so headers can be validated from any thread.

use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

use blast_core::{BlockHeader, Network};

pub mod algorithm;
pub mod arith;
pub mod auxpow;
pub mod chain;
pub mod difficulty;
pub mod params;
#[cfg(any(test, feature = "test-params"))]
pub mod testing;
pub mod versionbits;

/// Re-export consensus types
pub use algorithm::{select_algorithm, ParentPow, PowAlgorithm, PowError, PowHasher, Sha256dPow};
pub use arith::{CompactError, U256};
pub use auxpow::{verify_auxpow, AuxPowError};
pub use chain::BlockIndexEntry;
pub use difficulty::{check_proof_of_work, next_work_required, DifficultyError};
pub use params::{ChainParams, Deployment, DeploymentPos, ParamsError};
pub use versionbits::{DeploymentStats, ThresholdState, VersionBitsCache};

/// Consensus engine for validating headers against one network's rules
pub struct ConsensusEngine {
    /// Consensus parameters
    params: Arc<ChainParams>,
    /// Proof-of-work hasher for our own headers
    hasher: Arc<dyn PowHasher>,
    /// Proof-of-work hasher for AuxPow parent headers
    parent_pow: Arc<dyn ParentPow>,
    /// Deployment states by window boundary
    versionbits: VersionBitsCache,
}

impl ConsensusEngine {
    /// Create an engine hashing with double SHA256
    pub fn new(params: ChainParams) -> Self {
        Self::with_hashers(params, Arc::new(Sha256dPow), Arc::new(Sha256dPow))
    }

    /// Create an engine with the standard parameters of `network`
    pub fn for_network(network: Network) -> Self {
        Self::new(ChainParams::for_network(network))
    }

    /// Create an engine with custom proof-of-work hashers
    pub fn with_hashers(params: ChainParams, hasher: Arc<dyn PowHasher>, parent_pow: Arc<dyn ParentPow>) -> Self {
        ConsensusEngine {
            params: Arc::new(params),
            hasher,
            parent_pow,
            versionbits: VersionBitsCache::new(),
        }
    }

    /// Get the consensus parameters
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Algorithm the proof of work of `header` is computed with
    pub fn algorithm_for(&self, header: &BlockHeader) -> PowAlgorithm {
        select_algorithm(header.timestamp, &self.params)
    }

    /// Validate the proof of work of a header at `height`, either its own or
    /// the attached AuxPow
    pub fn check_proof_of_work(&self, header: &BlockHeader, height: u32) -> Result<(), ConsensusError> {
        auxpow::check_version(header, height, &self.params)?;

        if header.auxpow().is_some() {
            verify_auxpow(header, height, &self.params, self.parent_pow.as_ref())?;
            return Ok(());
        }

        let algorithm = self.algorithm_for(header);
        let hash = self.hasher.pow_hash(algorithm, header, &self.params.header_format())?;
        check_proof_of_work(&hash, header.bits, &self.params)?;

        Ok(())
    }

    /// Version rules that depend on the height of the header
    pub fn check_contextual_version(&self, header: &BlockHeader, height: u32) -> Result<(), ConsensusError> {
        let start = self.params.auxpow_start_height();

        if height < start && header.is_auxpow() {
            return Err(ConsensusError::AuxPowNotAllowed(height));
        }
        if height >= start && header.is_legacy() {
            return Err(ConsensusError::LegacyVersion(height));
        }

        Ok(())
    }

    /// Validate `header` as the child of `prev`, or as genesis when `prev` is `None`
    pub fn check_header(&self, header: &BlockHeader, prev: Option<&BlockIndexEntry>) -> Result<(), ConsensusError> {
        let result = self.check_header_inner(header, prev);
        if let Err(e) = &result {
            debug!("Rejected header {}: {}", blast_util::hash_to_hex(&header.hash(&self.params.header_format())), e);
        }
        result
    }

    fn check_header_inner(&self, header: &BlockHeader, prev: Option<&BlockIndexEntry>) -> Result<(), ConsensusError> {
        let prev = match prev {
            Some(prev) => prev,
            None => {
                if header.hash(&self.params.header_format()) != self.params.genesis_hash() {
                    return Err(ConsensusError::UnknownGenesis);
                }
                return self.check_proof_of_work(header, 0);
            }
        };

        let height = prev.height() + 1;

        if &header.prev_block_hash != prev.hash() {
            return Err(ConsensusError::PrevBlockMismatch(height));
        }

        self.check_contextual_version(header, height)?;

        let expected = next_work_required(prev, header.timestamp, &self.params)?;
        if header.bits != expected {
            return Err(ConsensusError::UnexpectedBits {
                expected,
                found: header.bits,
            });
        }

        self.check_proof_of_work(header, height)
    }

    /// Check the proof of work of many `(header, height)` pairs in parallel.
    ///
    /// Results are returned in input order.
    pub fn check_proofs_parallel(&self, headers: &[(BlockHeader, u32)]) -> Vec<Result<(), ConsensusError>> {
        let results: Vec<_> = headers
            .par_iter()
            .map(|(header, height)| self.check_proof_of_work(header, *height))
            .collect();

        let rejected = results.iter().filter(|r| r.is_err()).count();
        if rejected > 0 {
            warn!("{} of {} headers failed proof-of-work checks", rejected, headers.len());
        }

        results
    }

    /// State of a deployment for the block after `prev`
    pub fn deployment_state(&self, prev: Option<&BlockIndexEntry>, pos: DeploymentPos) -> ThresholdState {
        versionbits::state_for(prev, &self.params, pos, &self.versionbits)
    }

    /// Height since which a deployment has been in its current state
    pub fn deployment_since(&self, prev: Option<&BlockIndexEntry>, pos: DeploymentPos) -> u32 {
        versionbits::state_since_height(prev, &self.params, pos, &self.versionbits)
    }

    /// Version a new block on top of `prev` should signal
    pub fn block_version(&self, prev: Option<&BlockIndexEntry>) -> i32 {
        versionbits::compute_block_version(prev, &self.params, &self.versionbits)
    }
}

/// Consensus errors
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("AuxPow error: {0}")]
    AuxPow(#[from] AuxPowError),

    #[error("Difficulty error: {0}")]
    Difficulty(#[from] DifficultyError),

    #[error("Proof-of-work error: {0}")]
    Pow(#[from] PowError),

    #[error("Merge-mined header at height {0} before auxpow activation")]
    AuxPowNotAllowed(u32),

    #[error("Legacy version header at height {0}")]
    LegacyVersion(u32),

    #[error("Unexpected bits {found:#010x}, expected {expected:#010x}")]
    UnexpectedBits { expected: u32, found: u32 },

    #[error("Header at height {0} does not extend its parent")]
    PrevBlockMismatch(u32),

    #[error("Genesis header does not match the network")]
    UnknownGenesis,
}
