//! In-memory block index
//!
//! Entries are immutable once built and link to their parent through an
//! `Arc`, so any number of validation threads can walk the same chain.
//! Storage and chain selection live elsewhere; this is only the view the
//! consensus rules need.

use std::sync::Arc;

use blast_core::{BlockHeader, Hash, HeaderFormat};

use crate::arith::U256;
use crate::difficulty::block_proof;

/// Number of blocks used for the median time past
pub const MEDIAN_TIME_SPAN: usize = 11;

/// One block in the index
#[derive(Debug)]
pub struct BlockIndexEntry {
    hash: Hash,
    prev: Option<Arc<BlockIndexEntry>>,
    height: u32,
    version: i32,
    time: u32,
    bits: u32,
    chain_work: U256,
}

impl BlockIndexEntry {
    /// Index a header on top of `prev` (or as genesis when `prev` is `None`)
    pub fn new(header: &BlockHeader, prev: Option<Arc<BlockIndexEntry>>, format: &HeaderFormat) -> Self {
        let height = prev.as_ref().map(|p| p.height + 1).unwrap_or(0);
        Self::with_height(
            header.hash(format),
            prev,
            height,
            header.version(),
            header.timestamp,
            header.bits,
        )
    }

    /// Build an entry from its parts at an explicit height
    pub fn with_height(
        hash: Hash,
        prev: Option<Arc<BlockIndexEntry>>,
        height: u32,
        version: i32,
        time: u32,
        bits: u32,
    ) -> Self {
        let parent_work = prev.as_ref().map(|p| p.chain_work).unwrap_or_else(U256::zero);
        let chain_work = parent_work.saturating_add(block_proof(bits));

        BlockIndexEntry {
            hash,
            prev,
            height,
            version,
            time,
            bits,
            chain_work,
        }
    }

    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn prev(&self) -> Option<&BlockIndexEntry> {
        self.prev.as_deref()
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Total work of the chain up to and including this block
    pub fn chain_work(&self) -> U256 {
        self.chain_work
    }

    /// The ancestor at `height`, or `None` when it is above this block or not indexed
    pub fn ancestor(&self, height: u32) -> Option<&BlockIndexEntry> {
        if height > self.height {
            return None;
        }

        let mut entry = self;
        while entry.height > height {
            entry = entry.prev()?;
        }
        Some(entry)
    }

    /// Median timestamp of this block and up to ten predecessors
    pub fn median_time_past(&self) -> i64 {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut entry = Some(self);

        while let Some(current) = entry {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            times.push(current.time as i64);
            entry = current.prev();
        }

        times.sort_unstable();
        times[times.len() / 2]
    }
}

impl Drop for BlockIndexEntry {
    // Unlink long chains iteratively instead of recursing once per block
    fn drop(&mut self) {
        let mut next = self.prev.take();
        while let Some(entry) = next {
            match Arc::try_unwrap(entry) {
                Ok(mut owned) => next = owned.prev.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blast_core::Network;
    use crate::params::ChainParams;

    fn build_chain(times: &[u32], bits: u32) -> Arc<BlockIndexEntry> {
        let mut prev: Option<Arc<BlockIndexEntry>> = None;
        for (height, time) in times.iter().enumerate() {
            let mut hash = [0u8; 32];
            hash[0] = height as u8;
            prev = Some(Arc::new(BlockIndexEntry::with_height(hash, prev, height as u32, 4, *time, bits)));
        }
        prev.expect("non-empty chain")
    }

    #[test]
    fn test_index_from_header() {
        let params = ChainParams::get(Network::Regtest);
        let genesis = &params.genesis_block().header;
        let entry = BlockIndexEntry::new(genesis, None, &params.header_format());

        assert_eq!(entry.height(), 0);
        assert_eq!(entry.hash(), &params.genesis_hash());
        assert_eq!(entry.chain_work(), U256::from(2u64));

        let child = BlockIndexEntry::new(genesis, Some(Arc::new(entry)), &params.header_format());
        assert_eq!(child.height(), 1);
        assert_eq!(child.chain_work(), U256::from(4u64));
    }

    #[test]
    fn test_ancestor() {
        let tip = build_chain(&[10, 20, 30, 40, 50], 0x207fffff);
        assert_eq!(tip.ancestor(4).map(|e| e.time()), Some(50));
        assert_eq!(tip.ancestor(0).map(|e| e.time()), Some(10));
        assert_eq!(tip.ancestor(2).map(|e| e.height()), Some(2));
        assert!(tip.ancestor(5).is_none());
    }

    #[test]
    fn test_median_time_past() {
        let tip = build_chain(&[5, 1, 4, 2, 3], 0x207fffff);
        assert_eq!(tip.median_time_past(), 3);

        // Only the last eleven blocks count
        let times: Vec<u32> = (0..20).map(|i| 1000 + i * 10).collect();
        let tip = build_chain(&times, 0x207fffff);
        assert_eq!(tip.median_time_past(), 1140);

        let single = build_chain(&[77], 0x207fffff);
        assert_eq!(single.median_time_past(), 77);
    }

    #[test]
    fn test_long_chain_drops() {
        let times: Vec<u32> = (0..200_000).collect();
        let tip = build_chain(&times, 0x207fffff);
        assert_eq!(tip.chain_work(), U256::from(400_000u64));
        drop(tip);
    }
}
