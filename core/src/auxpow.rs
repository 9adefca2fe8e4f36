//! Auxiliary proof-of-work payload
//!
//! A merge-mined header does not carry its own proof of work. Instead it
//! carries the coinbase of a parent-chain block whose script commits to the
//! merged-mining merkle root, the merkle proofs tying the coinbase to the
//! parent block and our block to that root, and the parent header itself.
//!
//! Verification lives in the consensus crate. This module only defines the
//! data and its wire format:
//!
//! ```text
//! coinbase tx | parent block hash | coinbase branch | coinbase index (i32)
//!             | chain branch | chain index (i32) | parent header (80 bytes)
//! ```

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use blast_crypto::walk_merkle_branch;

use crate::block::PureBlockHeader;
use crate::encode::{self, CodecError};
use crate::transaction::Transaction;
use crate::Hash;

/// A merkle path with its side bitmask.
///
/// Bit `i` of `side_mask` set means the sibling at depth `i` is the left input
/// of the pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBranch {
    /// Sibling hashes from the leaf upwards
    pub hashes: Vec<Hash>,

    /// Position of the leaf, one bit per level
    pub side_mask: u32,
}

impl MerkleBranch {
    /// Create a new branch
    pub fn new(hashes: Vec<Hash>, side_mask: u32) -> Self {
        MerkleBranch { hashes, side_mask }
    }

    /// Number of levels in the branch
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Root obtained by hashing `leaf` up through this branch
    pub fn root_from(&self, leaf: &Hash) -> Hash {
        walk_merkle_branch(leaf, &self.hashes, self.side_mask)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        encode::put_hash_vec(buf, &self.hashes);
        encode::put_i32(buf, self.side_mask as i32);
    }

    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let hashes = encode::read_hash_vec(reader)?;
        let side_mask = reader.read_i32::<LittleEndian>()? as u32;
        Ok(MerkleBranch { hashes, side_mask })
    }
}

/// Auxiliary proof of work attached to a merge-mined header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxPow {
    /// Coinbase transaction of the parent block
    pub coinbase_tx: Transaction,

    /// Hash of the parent block as recorded by the miner. Carried on the
    /// wire but not consulted during verification.
    pub parent_block_hash: Hash,

    /// Path from the coinbase txid to the parent header's merkle root
    pub coinbase_branch: MerkleBranch,

    /// Path from our block hash to the merged-mining root
    pub chain_branch: MerkleBranch,

    /// The parent chain block header
    pub parent_block: PureBlockHeader,
}

impl AuxPow {
    /// Append the wire encoding to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.coinbase_tx.encode(buf);
        encode::put_hash(buf, &self.parent_block_hash);
        self.coinbase_branch.encode(buf);
        self.chain_branch.encode(buf);
        buf.extend_from_slice(&self.parent_block.serialize());
    }

    /// Wire encoding
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Decode from the wire encoding
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let coinbase_tx = Transaction::decode(reader)?;
        let parent_block_hash = encode::read_hash(reader)?;
        let coinbase_branch = MerkleBranch::decode(reader)?;
        let chain_branch = MerkleBranch::decode(reader)?;
        let parent_block = PureBlockHeader::decode(reader)?;

        Ok(AuxPow {
            coinbase_tx,
            parent_block_hash,
            coinbase_branch,
            chain_branch,
            parent_block,
        })
    }

    /// Merkle root the parent header must commit to
    pub fn coinbase_merkle_root(&self) -> Hash {
        self.coinbase_branch.root_from(&self.coinbase_tx.txid())
    }

    /// Merged-mining root implied by `block_hash` and the chain branch
    pub fn chain_merkle_root(&self, block_hash: &Hash) -> Hash {
        self.chain_branch.root_from(block_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionOutput;
    use blast_crypto::{hash_pair, merkle_branch, merkle_root};

    fn sample_auxpow() -> AuxPow {
        let coinbase = Transaction::coinbase(
            vec![0xfa, 0xbe, 0x6d, 0x6d, 0x01, 0x02],
            vec![TransactionOutput::new(5_000_000_000, vec![0x51])],
        );

        AuxPow {
            coinbase_tx: coinbase,
            parent_block_hash: [7; 32],
            coinbase_branch: MerkleBranch::new(vec![[1; 32], [2; 32]], 0),
            chain_branch: MerkleBranch::new(vec![[3; 32]], 1),
            parent_block: PureBlockHeader::new(2, [4; 32], [5; 32], 1_600_000_000, 0x207fffff, 99),
        }
    }

    #[test]
    fn test_wire_encoding_restores_auxpow() {
        let auxpow = sample_auxpow();
        let bytes = auxpow.serialize();
        let decoded = AuxPow::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, auxpow);
    }

    #[test]
    fn test_wire_layout_ends_with_parent_header() {
        let auxpow = sample_auxpow();
        let bytes = auxpow.serialize();
        let tail = &bytes[bytes.len() - 80..];
        assert_eq!(tail, &auxpow.parent_block.serialize()[..]);

        // Chain index sits right before the parent header
        let index_bytes = &bytes[bytes.len() - 84..bytes.len() - 80];
        assert_eq!(index_bytes, &[1, 0, 0, 0]);
    }

    #[test]
    fn test_branch_root_matches_tree() {
        let leaves = [[10u8; 32], [11; 32], [12; 32], [13; 32]];
        let (root, _) = merkle_root(&leaves);

        for index in 0..leaves.len() {
            let (hashes, mask) = merkle_branch(&leaves, index).unwrap();
            let branch = MerkleBranch::new(hashes, mask);
            assert_eq!(branch.root_from(&leaves[index]), root);
        }
    }

    #[test]
    fn test_side_mask_orders_pair() {
        let leaf = [1u8; 32];
        let sibling = [2u8; 32];

        let right = MerkleBranch::new(vec![sibling], 0);
        assert_eq!(right.root_from(&leaf), hash_pair(&leaf, &sibling));

        let left = MerkleBranch::new(vec![sibling], 1);
        assert_eq!(left.root_from(&leaf), hash_pair(&sibling, &leaf));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = sample_auxpow().serialize();
        let truncated = &bytes[..bytes.len() - 10];
        assert!(AuxPow::decode(&mut &truncated[..]).is_err());
    }
}
