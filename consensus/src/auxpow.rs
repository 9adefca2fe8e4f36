//! Merged-mining (AuxPow) verification
//!
//! A merge-mined header proves its work through a parent-chain block. The
//! header's hash sits in a merkle tree of merge-mined chains whose root is
//! committed in the parent coinbase script, the coinbase is tied to the parent
//! header by a merkle branch, and the parent header carries the work. Every
//! check returns a distinct error; nothing here panics on hostile input.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use thiserror::Error;

use blast_core::{BlockHeader, Hash};

use crate::algorithm::ParentPow;
use crate::difficulty::{check_proof_of_work, DifficultyError};
use crate::params::ChainParams;

/// Merged-mining magic preceding the chain merkle root in the coinbase script
pub const MERGED_MINING_HEADER: [u8; 4] = [0xfa, 0xbe, 0x6d, 0x6d];

/// Deepest chain merkle tree accepted
pub const MAX_CHAIN_BRANCH_LENGTH: usize = 30;

/// Without the magic, the root must start within this many script bytes
pub const MAX_LEGACY_ROOT_OFFSET: usize = 20;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VersionFault {
    #[error("auxpow flag set without payload")]
    FlagWithoutPayload,

    #[error("payload attached without auxpow flag")]
    PayloadWithoutFlag,

    #[error("parent header has the auxpow flag")]
    ParentIsAuxPow,

    #[error("parent header uses our chain ID {0:#x}")]
    ParentHasOurChainId(i32),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoinbaseProofFault {
    #[error("coinbase is not the first transaction (index {0})")]
    NotFirst(u32),

    #[error("branch does not lead to the parent merkle root")]
    RootMismatch,

    #[error("coinbase has no inputs")]
    NoInput,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChainProofFault {
    #[error("branch has {0} levels")]
    BranchTooLong(usize),

    #[error("committed tree size {found}, expected {expected}")]
    WrongTreeSize { expected: u32, found: u32 },

    #[error("chain index {found}, expected {expected}")]
    WrongIndex { expected: u32, found: u32 },

    #[error("branch does not lead to the committed root")]
    RootMismatch,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentFault {
    #[error("chain merkle root not found in coinbase")]
    RootNotFound,

    #[error("more than one merged-mining header")]
    MultipleHeaders,

    #[error("merged-mining header not directly before the root")]
    HeaderNotBeforeRoot,

    #[error("root starts too late in the coinbase script")]
    RootTooDeep,

    #[error("size and nonce missing after the root")]
    MissingSizeAndNonce,
}

/// AuxPow rejections
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuxPowError {
    #[error("Malformed version: {0}")]
    MalformedVersion(VersionFault),

    #[error("Wrong chain ID {chain_id:#x} at height {height}")]
    WrongChainId { chain_id: i32, height: u32 },

    #[error("Bad coinbase merkle proof: {0}")]
    BadCoinbaseMerkleProof(CoinbaseProofFault),

    #[error("Bad chain merkle proof: {0}")]
    BadChainMerkleProof(ChainProofFault),

    #[error("Missing or ambiguous merged-mining commitment: {0}")]
    MissingOrAmbiguousCommitment(CommitmentFault),

    #[error("Parent proof of work invalid: {0}")]
    ParentPowInvalid(#[from] DifficultyError),
}

/// Slot a chain must occupy in a merged-mining tree of depth `height`
pub fn expected_index(nonce: u32, chain_id: i32, height: usize) -> u32 {
    let mut rand = nonce;
    rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);
    rand = rand.wrapping_add(chain_id as u32);
    rand = rand.wrapping_mul(1_103_515_245).wrapping_add(12_345);

    rand % (1u32 << height)
}

/// Version checks that apply to every header, merge-mined or not
pub fn check_version(header: &BlockHeader, height: u32, params: &ChainParams) -> Result<(), AuxPowError> {
    match (header.is_auxpow(), header.auxpow().is_some()) {
        (true, false) => return Err(AuxPowError::MalformedVersion(VersionFault::FlagWithoutPayload)),
        (false, true) => return Err(AuxPowError::MalformedVersion(VersionFault::PayloadWithoutFlag)),
        _ => {}
    }

    // Legacy headers predate chain IDs
    if !header.is_legacy() && params.strict_chain_id() && !params.accepts_chain_id(header.chain_id(), height) {
        return Err(AuxPowError::WrongChainId {
            chain_id: header.chain_id(),
            height,
        });
    }

    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// A single merged-mining header with room for a root after it, so the
/// script commits to some root, just not ours
fn has_foreign_root(script: &[u8], root_len: usize) -> bool {
    match find(script, &MERGED_MINING_HEADER) {
        Some(header_pos) => {
            find(&script[header_pos + 1..], &MERGED_MINING_HEADER).is_none()
                && script.len() >= header_pos + MERGED_MINING_HEADER.len() + root_len
        }
        None => false,
    }
}

/// Locate the commitment to `root` in `script`, returning the committed tree
/// size and nonce
fn find_commitment(script: &[u8], root: &Hash) -> Result<(u32, u32), CommitmentFault> {
    let root_pos = find(script, root).ok_or(CommitmentFault::RootNotFound)?;

    match find(script, &MERGED_MINING_HEADER) {
        Some(header_pos) => {
            if find(&script[header_pos + 1..], &MERGED_MINING_HEADER).is_some() {
                return Err(CommitmentFault::MultipleHeaders);
            }
            if header_pos + MERGED_MINING_HEADER.len() != root_pos {
                return Err(CommitmentFault::HeaderNotBeforeRoot);
            }
        }
        None => {
            if root_pos > MAX_LEGACY_ROOT_OFFSET {
                return Err(CommitmentFault::RootTooDeep);
            }
        }
    }

    let tail = &script[root_pos + root.len()..];
    if tail.len() < 8 {
        return Err(CommitmentFault::MissingSizeAndNonce);
    }

    Ok((LittleEndian::read_u32(&tail[..4]), LittleEndian::read_u32(&tail[4..8])))
}

/// Verify the auxiliary proof of work attached to `header` at `height`.
///
/// The parent header's work is measured against `header.bits`.
pub fn verify_auxpow(
    header: &BlockHeader,
    height: u32,
    params: &ChainParams,
    parent_pow: &dyn ParentPow,
) -> Result<(), AuxPowError> {
    check_version(header, height, params)?;

    let auxpow = header
        .auxpow()
        .ok_or(AuxPowError::MalformedVersion(VersionFault::FlagWithoutPayload))?;
    let chain_id = header.chain_id();
    let parent = &auxpow.parent_block;

    if parent.is_auxpow() {
        return Err(AuxPowError::MalformedVersion(VersionFault::ParentIsAuxPow));
    }
    if params.strict_chain_id() && parent.chain_id() == chain_id {
        return Err(AuxPowError::MalformedVersion(VersionFault::ParentHasOurChainId(chain_id)));
    }

    if auxpow.coinbase_branch.side_mask != 0 {
        return Err(AuxPowError::BadCoinbaseMerkleProof(CoinbaseProofFault::NotFirst(
            auxpow.coinbase_branch.side_mask,
        )));
    }

    let branch_len = auxpow.chain_branch.len();
    if branch_len > MAX_CHAIN_BRANCH_LENGTH {
        return Err(AuxPowError::BadChainMerkleProof(ChainProofFault::BranchTooLong(branch_len)));
    }

    // The script carries the root in display byte order
    let mut root = auxpow.chain_merkle_root(&header.hash(&params.header_format()));
    root.reverse();

    if auxpow.coinbase_merkle_root() != parent.merkle_root {
        return Err(AuxPowError::BadCoinbaseMerkleProof(CoinbaseProofFault::RootMismatch));
    }

    let script = &auxpow
        .coinbase_tx
        .inputs
        .first()
        .ok_or(AuxPowError::BadCoinbaseMerkleProof(CoinbaseProofFault::NoInput))?
        .script_sig;

    let (size, nonce) = find_commitment(script, &root).map_err(|fault| match fault {
        CommitmentFault::RootNotFound if has_foreign_root(script, root.len()) => {
            AuxPowError::BadChainMerkleProof(ChainProofFault::RootMismatch)
        }
        fault => AuxPowError::MissingOrAmbiguousCommitment(fault),
    })?;

    let expected_size = 1u32 << branch_len;
    if size != expected_size {
        return Err(AuxPowError::BadChainMerkleProof(ChainProofFault::WrongTreeSize {
            expected: expected_size,
            found: size,
        }));
    }

    let expected = expected_index(nonce, chain_id, branch_len);
    if auxpow.chain_branch.side_mask != expected {
        return Err(AuxPowError::BadChainMerkleProof(ChainProofFault::WrongIndex {
            expected,
            found: auxpow.chain_branch.side_mask,
        }));
    }

    let parent_hash = parent_pow.parent_pow_hash(parent);
    check_proof_of_work(&parent_hash, header.bits, params)?;

    debug!(
        "Accepted auxpow at height {} (chain ID {:#x}, parent {})",
        height,
        chain_id,
        blast_util::hash_to_hex(&parent.hash())
    );

    Ok(())
}

/// Builders for valid merge-mined headers at regtest difficulty
#[cfg(test)]
pub(crate) mod fixture {
    use super::*;
    use blast_core::version::{compose, with_auxpow_flag};
    use blast_core::{AuxPow, MerkleBranch, PureBlockHeader, Transaction, TransactionOutput};
    use blast_crypto::walk_merkle_branch;

    pub const CHAIN_TIME: u32 = 1_500_000_000;

    /// Knobs for one merge-mined header
    pub struct Fixture {
        pub chain_id: i32,
        pub parent_version: i32,
        pub branch_len: usize,
        pub nonce: u32,
        pub coinbase_index: u32,
        pub chain_index: Option<u32>,
        pub bits: u32,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Fixture {
                chain_id: 0x1940,
                parent_version: 4,
                branch_len: 2,
                nonce: 12_345,
                coinbase_index: 0,
                chain_index: None,
                bits: 0x207fffff,
            }
        }
    }

    /// Standard commitment: magic, root, size, nonce after a short prefix
    pub fn standard_script(root: &Hash, size: u32, nonce: u32) -> Vec<u8> {
        let mut script = vec![0x03, 0x01, 0x02, 0x03];
        script.extend_from_slice(&MERGED_MINING_HEADER);
        script.extend_from_slice(root);
        script.extend_from_slice(&size.to_le_bytes());
        script.extend_from_slice(&nonce.to_le_bytes());
        script
    }

    impl Fixture {
        pub fn build(&self, params: &ChainParams) -> BlockHeader {
            self.build_with(params, standard_script)
        }

        /// Build with a custom coinbase script given the reversed root,
        /// tree size and nonce
        pub fn build_with(&self, params: &ChainParams, script: impl Fn(&Hash, u32, u32) -> Vec<u8>) -> BlockHeader {
            let format = params.header_format();
            let version = with_auxpow_flag(compose(4, self.chain_id), true);
            let mut header = BlockHeader::new(version, [0x0a; 32], [0x0b; 32], CHAIN_TIME, self.bits, 0, 1);

            let chain_index = self
                .chain_index
                .unwrap_or_else(|| expected_index(self.nonce, self.chain_id, self.branch_len));
            let chain_siblings: Vec<Hash> = (0..self.branch_len).map(|i| [0x10 + i as u8; 32]).collect();
            let chain_branch = MerkleBranch::new(chain_siblings, chain_index);

            let mut root = chain_branch.root_from(&header.hash(&format));
            root.reverse();

            let size = 1u32.checked_shl(self.branch_len as u32).unwrap_or(0);
            let coinbase_tx = Transaction::coinbase(
                script(&root, size, self.nonce),
                vec![TransactionOutput::new(5_000_000_000, vec![0x51])],
            );

            let coinbase_siblings = vec![[0x33; 32]];
            let merkle_root = walk_merkle_branch(&coinbase_tx.txid(), &coinbase_siblings, self.coinbase_index);
            let coinbase_branch = MerkleBranch::new(coinbase_siblings, self.coinbase_index);

            let mut parent = PureBlockHeader::new(self.parent_version, [0x44; 32], merkle_root, CHAIN_TIME, 0x1d00ffff, 0);
            while check_proof_of_work(&parent.hash(), self.bits, params).is_err() {
                parent.nonce += 1;
            }

            header.set_auxpow(Some(AuxPow {
                coinbase_tx,
                parent_block_hash: parent.hash(),
                coinbase_branch,
                chain_branch,
                parent_block: parent,
            }));
            header
        }
    }
}
