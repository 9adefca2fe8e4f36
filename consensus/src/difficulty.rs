//! Difficulty Adjustment Algorithm for BLAST
//!
//! Classic interval retargeting: every `timespan / spacing` blocks the target
//! is scaled by how long the last interval actually took, limited to a factor
//! of four either way and never easier than the network's proof-of-work
//! limit. Networks that allow minimum-difficulty blocks accept a block at the
//! limit when it arrives more than two spacings after its parent.

use log::{debug, info};
use thiserror::Error;

use blast_core::Hash;

use crate::arith::{compact_from_target, decode_compact, hash_to_u256, target_from_compact, U256};
use crate::chain::BlockIndexEntry;
use crate::params::ChainParams;

/// Difficulty and proof-of-work errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DifficultyError {
    /// Compact target is negative, overflows or is easier than the limit
    #[error("Target out of range: {0:#010x}")]
    TargetOutOfRange(u32),

    /// Hash is above the target
    #[error("Insufficient proof of work for bits {0:#010x}")]
    InsufficientWork(u32),

    /// Block index does not reach back to the start of the interval
    #[error("Missing ancestor at height {0}")]
    MissingAncestor(u32),
}

/// Compact target the block after `prev` must carry
pub fn next_work_required(
    prev: &BlockIndexEntry,
    candidate_time: u32,
    params: &ChainParams,
) -> Result<u32, DifficultyError> {
    let pow_limit_bits = compact_from_target(&params.pow_limit());
    let interval = params.difficulty_adjustment_interval();
    let next_height = prev.height() as i64 + 1;

    if next_height % interval != 0 {
        if params.allow_min_difficulty_blocks() {
            // Special rule: a slow block may be mined at minimum difficulty
            if candidate_time as i64 > prev.time() as i64 + params.pow_target_spacing() * 2 {
                info!(
                    "Minimum difficulty allowed at height {}: {}s since previous block",
                    next_height,
                    candidate_time as i64 - prev.time() as i64
                );
                return Ok(pow_limit_bits);
            }

            // Otherwise use the last block that was not mined under the special rule
            let mut index = prev;
            while let Some(parent) = index.prev() {
                if index.height() as i64 % interval == 0 || index.bits() != pow_limit_bits {
                    break;
                }
                index = parent;
            }
            return Ok(index.bits());
        }
        return Ok(prev.bits());
    }

    let first_height = (next_height - interval) as u32;
    let first = prev
        .ancestor(first_height)
        .ok_or(DifficultyError::MissingAncestor(first_height))?;

    calculate_next_work_required(prev, first.time() as i64, params)
}

/// Retarget from the interval ending at `prev` and starting at `first_block_time`
pub fn calculate_next_work_required(
    prev: &BlockIndexEntry,
    first_block_time: i64,
    params: &ChainParams,
) -> Result<u32, DifficultyError> {
    if params.no_retargeting() {
        return Ok(prev.bits());
    }

    let timespan = params.pow_target_timespan();
    let actual_timespan = (prev.time() as i64 - first_block_time).clamp(timespan / 4, timespan * 4);

    let pow_limit = params.pow_limit();
    let prev_target = target_from_compact(prev.bits())
        .map_err(|_| DifficultyError::TargetOutOfRange(prev.bits()))?;

    let new_target = prev_target
        .checked_mul(U256::from(actual_timespan as u64))
        .map(|scaled| scaled / U256::from(timespan as u64))
        .unwrap_or(pow_limit)
        .min(pow_limit);
    let new_bits = compact_from_target(&new_target);

    debug!(
        "Retarget at height {}: timespan {}s (target {}s), bits {:08x} -> {:08x}",
        prev.height() + 1,
        actual_timespan,
        timespan,
        prev.bits(),
        new_bits
    );

    Ok(new_bits)
}

/// Check that `hash` satisfies the compact target `bits`
pub fn check_proof_of_work(hash: &Hash, bits: u32, params: &ChainParams) -> Result<(), DifficultyError> {
    let decoded = decode_compact(bits);
    if decoded.negative
        || decoded.overflow
        || decoded.target.is_zero()
        || decoded.target > params.pow_limit()
    {
        return Err(DifficultyError::TargetOutOfRange(bits));
    }

    if hash_to_u256(hash) > decoded.target {
        return Err(DifficultyError::InsufficientWork(bits));
    }

    Ok(())
}

/// Expected number of hashes needed to meet `bits`
pub fn block_proof(bits: u32) -> U256 {
    let decoded = decode_compact(bits);
    if decoded.negative || decoded.overflow || decoded.target.is_zero() {
        return U256::zero();
    }

    // 2**256 / (target + 1) computed as ~target / (target + 1) + 1
    match decoded.target.checked_add(U256::one()) {
        Some(divisor) => (!decoded.target / divisor) + U256::one(),
        None => U256::one(),
    }
}

/// Seconds the chain at `tip`'s difficulty needs to produce the work between `from` and `to`.
///
/// Negative when `from` carries more work than `to`.
pub fn block_proof_equivalent_time(
    to: &BlockIndexEntry,
    from: &BlockIndexEntry,
    tip: &BlockIndexEntry,
    params: &ChainParams,
) -> i64 {
    let (work, sign) = if to.chain_work() > from.chain_work() {
        (to.chain_work() - from.chain_work(), 1i64)
    } else {
        (from.chain_work() - to.chain_work(), -1i64)
    };

    let tip_proof = block_proof(tip.bits());
    if tip_proof.is_zero() {
        return sign * i64::MAX;
    }

    let seconds = match work.checked_mul(U256::from(params.pow_target_spacing() as u64)) {
        Some(scaled) => scaled / tip_proof,
        None => return sign * i64::MAX,
    };

    if seconds.bits() > 63 {
        return sign * i64::MAX;
    }
    sign * seconds.low_u64() as i64
}

/// Difficulty relative to the minimum `0x1d00ffff` target, for display
pub fn difficulty(bits: u32) -> f64 {
    let mantissa = bits & 0x00ff_ffff;
    if mantissa == 0 {
        return 0.0;
    }

    let mut shift = (bits >> 24) & 0xff;
    let mut diff = 0x0000_ffff as f64 / mantissa as f64;

    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }

    diff
}
