//! Version-bits soft-fork deployment tracking
//!
//! Each deployment moves through `Defined -> Started -> LockedIn -> Active`,
//! or ends in `Failed` when its timeout passes first. States only change at
//! confirmation window boundaries and are derived from the block index by
//! walking window-aligned ancestors, so they follow reorganizations without
//! any stored state. The optional cache is keyed by block hash for the same
//! reason.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use log::debug;
use serde::{Deserialize, Serialize};

use blast_core::version::{signals_bit, VERSIONBITS_TOP_BITS};
use blast_core::Hash;

use crate::chain::BlockIndexEntry;
use crate::params::{ChainParams, Deployment, DeploymentPos, ALWAYS_ACTIVE, NEVER_ACTIVE};

/// Deployment state of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

impl fmt::Display for ThresholdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThresholdState::Defined => "defined",
            ThresholdState::Started => "started",
            ThresholdState::LockedIn => "locked_in",
            ThresholdState::Active => "active",
            ThresholdState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Signaling progress within the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStats {
    /// Blocks per window
    pub period: u32,
    /// Signaling blocks needed to lock in
    pub threshold: u32,
    /// Blocks of the current window seen so far
    pub elapsed: u32,
    /// Signaling blocks among them
    pub count: u32,
    /// Whether the threshold can still be reached in this window
    pub possible: bool,
}

/// Memoized deployment states keyed by window-boundary block hash
#[derive(Debug, Default)]
pub struct VersionBitsCache {
    states: RwLock<HashMap<(DeploymentPos, Hash), ThresholdState>>,
}

impl VersionBitsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, pos: DeploymentPos, hash: &Hash) -> Option<ThresholdState> {
        self.states.read().ok()?.get(&(pos, *hash)).copied()
    }

    fn insert(&self, pos: DeploymentPos, hash: Hash, state: ThresholdState) {
        if let Ok(mut states) = self.states.write() {
            states.insert((pos, hash), state);
        }
    }

    /// Forget every cached state
    pub fn clear(&self) {
        if let Ok(mut states) = self.states.write() {
            states.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.states.read().map(|states| states.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last block of the window before the one containing the child of `prev`
fn window_boundary(prev: &BlockIndexEntry, period: u32) -> Option<&BlockIndexEntry> {
    let height = prev.height() as i64 - ((prev.height() as i64 + 1) % period as i64);
    if height < 0 {
        return None;
    }
    prev.ancestor(height as u32)
}

fn previous_window(entry: &BlockIndexEntry, period: u32) -> Option<&BlockIndexEntry> {
    entry.height().checked_sub(period).and_then(|height| entry.ancestor(height))
}

fn count_signaling(last: &BlockIndexEntry, blocks: u32, deployment: &Deployment) -> u32 {
    let mut count = 0;
    let mut entry = Some(last);
    for _ in 0..blocks {
        match entry {
            Some(current) => {
                if signals_bit(current.version(), deployment.bit) {
                    count += 1;
                }
                entry = current.prev();
            }
            None => break,
        }
    }
    count
}

/// State of deployment `pos` for the block whose parent is `prev`
pub fn state_for(
    prev: Option<&BlockIndexEntry>,
    params: &ChainParams,
    pos: DeploymentPos,
    cache: &VersionBitsCache,
) -> ThresholdState {
    let deployment = params.deployment(pos);
    let period = params.miner_confirmation_window();
    let threshold = params.rule_change_activation_threshold();

    if deployment.start_time == ALWAYS_ACTIVE {
        return ThresholdState::Active;
    }
    if deployment.start_time == NEVER_ACTIVE {
        return ThresholdState::Failed;
    }

    // A block's state is the state of the first block of its window
    let mut cursor = prev.and_then(|p| window_boundary(p, period));

    // Walk back to a window with a known state
    let mut to_compute = Vec::new();
    let mut state = ThresholdState::Defined;
    while let Some(entry) = cursor {
        if let Some(cached) = cache.get(pos, entry.hash()) {
            state = cached;
            break;
        }
        if entry.median_time_past() < deployment.start_time {
            cache.insert(pos, *entry.hash(), ThresholdState::Defined);
            break;
        }
        to_compute.push(entry);
        cursor = previous_window(entry, period);
    }

    // Replay the windows forward
    while let Some(entry) = to_compute.pop() {
        let median_time = entry.median_time_past();
        let next = match state {
            ThresholdState::Defined => {
                if median_time >= deployment.timeout {
                    ThresholdState::Failed
                } else if median_time >= deployment.start_time {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }
            ThresholdState::Started => {
                if median_time >= deployment.timeout {
                    ThresholdState::Failed
                } else if count_signaling(entry, period, deployment) >= threshold {
                    ThresholdState::LockedIn
                } else {
                    ThresholdState::Started
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            ThresholdState::Active | ThresholdState::Failed => state,
        };

        if next != state {
            debug!(
                "Deployment {} {} -> {} at height {}",
                pos,
                state,
                next,
                entry.height() + 1
            );
        }

        cache.insert(pos, *entry.hash(), next);
        state = next;
    }

    state
}

/// Height of the first block that had the current state of `pos`
pub fn state_since_height(
    prev: Option<&BlockIndexEntry>,
    params: &ChainParams,
    pos: DeploymentPos,
    cache: &VersionBitsCache,
) -> u32 {
    if params.deployment(pos).start_time == ALWAYS_ACTIVE {
        return 0;
    }

    let initial = state_for(prev, params, pos, cache);
    if initial == ThresholdState::Defined {
        return 0;
    }

    let period = params.miner_confirmation_window();
    let mut boundary = match prev.and_then(|p| window_boundary(p, period)) {
        Some(entry) => entry,
        None => return 0,
    };

    while let Some(earlier) = previous_window(boundary, period) {
        if state_for(Some(earlier), params, pos, cache) != initial {
            break;
        }
        boundary = earlier;
    }

    boundary.height() + 1
}

/// Signaling statistics for the window containing `tip`
pub fn statistics(tip: Option<&BlockIndexEntry>, params: &ChainParams, pos: DeploymentPos) -> DeploymentStats {
    let period = params.miner_confirmation_window();
    let threshold = params.rule_change_activation_threshold();

    let (elapsed, count) = match tip {
        Some(entry) => {
            let elapsed = (entry.height() + 1) % period;
            (elapsed, count_signaling(entry, elapsed, params.deployment(pos)))
        }
        None => (0, 0),
    };

    DeploymentStats {
        period,
        threshold,
        elapsed,
        count,
        possible: period - threshold >= elapsed - count,
    }
}

/// Version a new block on top of `prev` should carry to signal pending deployments
pub fn compute_block_version(
    prev: Option<&BlockIndexEntry>,
    params: &ChainParams,
    cache: &VersionBitsCache,
) -> i32 {
    let mut version = VERSIONBITS_TOP_BITS;

    for pos in DeploymentPos::ALL {
        match state_for(prev, params, pos, cache) {
            ThresholdState::Started | ThresholdState::LockedIn => {
                version |= params.deployment(pos).mask();
            }
            _ => {}
        }
    }

    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ChainParamsBuilder;
    use blast_core::Network;
    use std::sync::Arc;

    const START: i64 = 10_000;
    const TIMEOUT: i64 = 20_000;
    const SIGNAL: i32 = VERSIONBITS_TOP_BITS | (1 << 28);

    fn params(timeout: i64) -> ChainParams {
        ChainParamsBuilder::new(Network::Regtest)
            .update_version_bits_parameters(DeploymentPos::TestDummy, START, timeout)
            .build()
    }

    struct Chain {
        tip: Option<Arc<BlockIndexEntry>>,
    }

    impl Chain {
        fn new() -> Self {
            Chain { tip: None }
        }

        fn height(&self) -> u32 {
            self.tip.as_ref().map(|t| t.height() + 1).unwrap_or(0)
        }

        /// Mine blocks until the chain has `total` blocks
        fn mine(mut self, total: u32, time: u32, version: i32) -> Self {
            while self.height() < total {
                let height = self.height();
                let mut hash = [0u8; 32];
                hash[..4].copy_from_slice(&height.to_le_bytes());
                let entry = BlockIndexEntry::with_height(hash, self.tip.take(), height, version, time, 0x207fffff);
                self.tip = Some(Arc::new(entry));
            }
            self
        }

        fn tip(&self) -> Option<&BlockIndexEntry> {
            self.tip.as_deref()
        }

        fn state(&self, params: &ChainParams, cache: &VersionBitsCache) -> ThresholdState {
            state_for(self.tip(), params, DeploymentPos::TestDummy, cache)
        }
    }

    #[test]
    fn test_defined_before_start() {
        let params = params(TIMEOUT);
        let cache = VersionBitsCache::new();

        assert_eq!(state_for(None, &params, DeploymentPos::TestDummy, &cache), ThresholdState::Defined);

        let chain = Chain::new().mine(1, 1, SIGNAL);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Defined);

        let chain = chain.mine(32, 5000, SIGNAL);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Defined);
    }

    #[test]
    fn test_started_then_failed_without_signaling() {
        let params = params(TIMEOUT);
        let cache = VersionBitsCache::new();

        let chain = Chain::new().mine(32, 5000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Defined);

        let chain = chain.mine(63, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Defined);
        let chain = chain.mine(64, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Started);

        let chain = chain.mine(96, 25_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Failed);

        // Terminal, even if miners start signaling afterwards
        let chain = chain.mine(200, 15_000, SIGNAL);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Failed);
        assert_eq!(state_since_height(chain.tip(), &params, DeploymentPos::TestDummy, &cache), 96);
    }

    #[test]
    fn test_lock_in_then_active_one_window_later() {
        let params = params(999_999_999);
        let cache = VersionBitsCache::new();

        let chain = Chain::new().mine(32, 5000, 4).mine(64, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Started);

        // 24 of 32 blocks signal
        let chain = chain.mine(88, 15_000, SIGNAL).mine(96, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::LockedIn);
        assert_eq!(state_since_height(chain.tip(), &params, DeploymentPos::TestDummy, &cache), 96);

        let chain = chain.mine(127, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::LockedIn);

        let chain = chain.mine(128, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Active);
        assert_eq!(state_since_height(chain.tip(), &params, DeploymentPos::TestDummy, &cache), 128);

        let chain = chain.mine(300, 30_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Active);
        assert_eq!(state_since_height(chain.tip(), &params, DeploymentPos::TestDummy, &cache), 128);
    }

    #[test]
    fn test_below_threshold_stays_started() {
        let params = params(999_999_999);
        let cache = VersionBitsCache::new();

        let chain = Chain::new()
            .mine(32, 5000, 4)
            .mine(64, 15_000, 4)
            .mine(87, 15_000, SIGNAL)
            .mine(96, 15_000, 4);
        assert_eq!(chain.state(&params, &cache), ThresholdState::Started);
        assert_eq!(state_since_height(chain.tip(), &params, DeploymentPos::TestDummy, &cache), 64);
    }

    #[test]
    fn test_cache_agrees_with_fresh_computation() {
        let params = params(999_999_999);
        let warm = VersionBitsCache::new();

        let chain = Chain::new()
            .mine(32, 5000, 4)
            .mine(64, 15_000, 4)
            .mine(96, 15_000, SIGNAL)
            .mine(160, 15_000, 4);

        let first = chain.state(&params, &warm);
        let second = chain.state(&params, &warm);
        assert!(!warm.is_empty());

        let cold = VersionBitsCache::new();
        assert_eq!(first, chain.state(&params, &cold));
        assert_eq!(first, second);
        assert_eq!(first, ThresholdState::Active);

        warm.clear();
        assert!(warm.is_empty());
    }

    #[test]
    fn test_sentinels() {
        let always = ChainParamsBuilder::new(Network::Regtest)
            .update_version_bits_parameters(DeploymentPos::Csv, ALWAYS_ACTIVE, crate::params::NO_TIMEOUT)
            .build();
        let never = ChainParamsBuilder::new(Network::Regtest)
            .update_version_bits_parameters(DeploymentPos::Csv, NEVER_ACTIVE, crate::params::NO_TIMEOUT)
            .build();
        let cache = VersionBitsCache::new();

        assert_eq!(state_for(None, &always, DeploymentPos::Csv, &cache), ThresholdState::Active);
        assert_eq!(state_since_height(None, &always, DeploymentPos::Csv, &cache), 0);
        assert_eq!(state_for(None, &never, DeploymentPos::Csv, &cache), ThresholdState::Failed);
    }

    #[test]
    fn test_statistics() {
        let params = params(999_999_999);

        let chain = Chain::new()
            .mine(64, 15_000, 4)
            .mine(74, 15_000, SIGNAL)
            .mine(76, 15_000, 4);
        let stats = statistics(chain.tip(), &params, DeploymentPos::TestDummy);

        assert_eq!(stats.period, 32);
        assert_eq!(stats.threshold, 24);
        assert_eq!(stats.elapsed, 12);
        assert_eq!(stats.count, 10);
        assert!(stats.possible);

        let chain = chain.mine(85, 15_000, 4);
        let stats = statistics(chain.tip(), &params, DeploymentPos::TestDummy);
        assert_eq!(stats.elapsed, 21);
        assert_eq!(stats.count, 10);
        assert!(!stats.possible);
    }

    #[test]
    fn test_compute_block_version() {
        let params = params(999_999_999);
        let cache = VersionBitsCache::new();

        let chain = Chain::new().mine(64, 15_000, 4);
        let version = compute_block_version(chain.tip(), &params, &cache);
        assert_eq!(version & blast_core::version::VERSIONBITS_TOP_MASK, VERSIONBITS_TOP_BITS);
        assert!(signals_bit(version, 28));

        let chain = chain.mine(96, 15_000, SIGNAL).mine(128, 15_000, SIGNAL);
        let version = compute_block_version(chain.tip(), &params, &cache);
        assert!(!signals_bit(version, 28));
    }
}
