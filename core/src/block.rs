//! Block and BlockHeader Implementations for BLAST
//!
//! Two header types exist. `PureBlockHeader` is the fixed 80-byte header that
//! parent chains use and that appears inside an AuxPow. `BlockHeader` is our
//! own header: the same fields plus a height that is serialized once the
//! KAWPOW era starts, and an optional AuxPow payload. Because an AuxPow holds
//! a `PureBlockHeader`, auxpow payloads cannot nest.

use std::fmt;
use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use blast_crypto::{merkle_root, sha256d};

use crate::auxpow::AuxPow;
use crate::encode::{self, CodecError};
use crate::version;
use crate::{Hash, Transaction};

/// Size of the fixed header fields on the wire
pub const PURE_HEADER_SIZE: usize = 80;

/// Header errors
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Base version rewritten after an auxpow was attached
    #[error("Cannot change the base version once auxpow is attached")]
    AuxPowAttached,

    /// Base version outside `1..AUXPOW`
    #[error("Invalid base version: {0}")]
    InvalidBaseVersion(i32),

    /// Chain ID does not fit in the version field
    #[error("Invalid chain ID: {0:#x}")]
    InvalidChainId(i32),

    /// Malformed encoding
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Block validation errors
#[derive(Debug, Error)]
pub enum BlockValidationError {
    /// Header merkle root does not match the transactions
    #[error("Invalid merkle root")]
    InvalidMerkleRoot,

    /// Transaction list produces a mutated merkle tree
    #[error("Duplicate transaction in merkle tree")]
    MutatedMerkleTree,

    /// Block carries no transactions
    #[error("Block has no transactions")]
    NoTransactions,

    /// First transaction is not a coinbase
    #[error("Invalid coinbase transaction: {0}")]
    InvalidCoinbase(String),
}

/// Network-dependent header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderFormat {
    /// Headers strictly later than this carry the height field
    pub kawpow_activation_time: u32,
}

impl HeaderFormat {
    /// Create a header format
    pub fn new(kawpow_activation_time: u32) -> Self {
        HeaderFormat { kawpow_activation_time }
    }

    /// Whether a header with `timestamp` carries the height field
    pub fn has_height(&self, timestamp: u32) -> bool {
        timestamp > self.kawpow_activation_time
    }
}

/// Which bytes of a header to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeMode {
    /// Everything, including the auxpow payload
    Full,
    /// Identity hash input: no auxpow
    Hash,
    /// KAWPOW hash input: no auxpow and no height
    KawpowInput,
}

/// Fixed 80-byte block header as mined on a parent chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PureBlockHeader {
    /// Block version
    pub version: i32,

    /// Hash of the previous block
    pub prev_block_hash: Hash,

    /// Merkle root of transactions
    pub merkle_root: Hash,

    /// Block timestamp
    pub timestamp: u32,

    /// Difficulty bits
    pub bits: u32,

    /// Nonce for proof of work
    pub nonce: u32,
}

impl PureBlockHeader {
    /// Create a new header
    pub fn new(
        version: i32,
        prev_block_hash: Hash,
        merkle_root: Hash,
        timestamp: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        PureBlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        }
    }

    /// Pack the header into its 80-byte wire form
    pub fn serialize(&self) -> [u8; PURE_HEADER_SIZE] {
        let mut data = [0u8; PURE_HEADER_SIZE];
        LittleEndian::write_i32(&mut data[0..4], self.version);
        data[4..36].copy_from_slice(&self.prev_block_hash);
        data[36..68].copy_from_slice(&self.merkle_root);
        LittleEndian::write_u32(&mut data[68..72], self.timestamp);
        LittleEndian::write_u32(&mut data[72..76], self.bits);
        LittleEndian::write_u32(&mut data[76..80], self.nonce);
        data
    }

    /// Read an 80-byte header
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let version = reader.read_i32::<LittleEndian>()?;
        let prev_block_hash = encode::read_hash(reader)?;
        let merkle_root = encode::read_hash(reader)?;
        let timestamp = reader.read_u32::<LittleEndian>()?;
        let bits = reader.read_u32::<LittleEndian>()?;
        let nonce = reader.read_u32::<LittleEndian>()?;

        Ok(PureBlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }

    /// Double SHA256 of the 80 header bytes
    pub fn hash(&self) -> Hash {
        sha256d(&self.serialize())
    }

    pub fn base_version(&self) -> i32 {
        version::base_version(self.version)
    }

    pub fn chain_id(&self) -> i32 {
        version::chain_id(self.version)
    }

    pub fn is_auxpow(&self) -> bool {
        version::is_auxpow(self.version)
    }

    pub fn is_legacy(&self) -> bool {
        version::is_legacy(self.version)
    }
}

/// Block header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version, changed only through the setters so the auxpow flag
    /// tracks the payload
    version: i32,

    /// Hash of the previous block
    pub prev_block_hash: Hash,

    /// Merkle root of transactions
    pub merkle_root: Hash,

    /// Block timestamp
    pub timestamp: u32,

    /// Difficulty bits
    pub bits: u32,

    /// Nonce for proof of work
    pub nonce: u32,

    /// Block height, serialized only after KAWPOW activation
    pub height: u32,

    /// Auxiliary proof of work, present exactly when the version flag is set
    auxpow: Option<Box<AuxPow>>,
}

impl BlockHeader {
    /// Create a new block header without auxpow
    pub fn new(
        version: i32,
        prev_block_hash: Hash,
        merkle_root: Hash,
        timestamp: u32,
        bits: u32,
        nonce: u32,
        height: u32,
    ) -> Self {
        BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
            height,
            auxpow: None,
        }
    }

    /// The fixed part of this header
    pub fn pure_header(&self) -> PureBlockHeader {
        PureBlockHeader::new(
            self.version,
            self.prev_block_hash,
            self.merkle_root,
            self.timestamp,
            self.bits,
            self.nonce,
        )
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn auxpow(&self) -> Option<&AuxPow> {
        self.auxpow.as_deref()
    }

    /// Attach or remove the auxpow, keeping the version flag in step
    pub fn set_auxpow(&mut self, auxpow: Option<AuxPow>) {
        self.version = version::with_auxpow_flag(self.version, auxpow.is_some());
        self.auxpow = auxpow.map(Box::new);
    }

    /// Set a fresh version from a base version and chain ID.
    ///
    /// Only allowed while no auxpow is attached.
    pub fn set_base_version(&mut self, base_version: i32, chain_id: i32) -> Result<(), HeaderError> {
        if self.auxpow.is_some() || self.is_auxpow() {
            return Err(HeaderError::AuxPowAttached);
        }
        if base_version < 1 || base_version >= version::BLOCK_VERSION_AUXPOW {
            return Err(HeaderError::InvalidBaseVersion(base_version));
        }
        if !version::is_valid_chain_id(chain_id) {
            return Err(HeaderError::InvalidChainId(chain_id));
        }

        self.version = version::compose(base_version, chain_id);
        Ok(())
    }

    /// Replace the chain ID, leaving every other version bit alone
    pub fn set_chain_id(&mut self, chain_id: i32) -> Result<(), HeaderError> {
        if !version::is_valid_chain_id(chain_id) {
            return Err(HeaderError::InvalidChainId(chain_id));
        }

        self.version = version::with_chain_id(self.version, chain_id);
        Ok(())
    }

    pub fn base_version(&self) -> i32 {
        version::base_version(self.version)
    }

    pub fn chain_id(&self) -> i32 {
        version::chain_id(self.version)
    }

    pub fn is_auxpow(&self) -> bool {
        version::is_auxpow(self.version)
    }

    pub fn is_legacy(&self) -> bool {
        version::is_legacy(self.version)
    }

    /// A header with zero bits is the null header
    pub fn is_null(&self) -> bool {
        self.bits == 0
    }

    /// Serialize the header in the requested mode
    pub fn serialize(&self, mode: SerializeMode, format: &HeaderFormat) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PURE_HEADER_SIZE + 4);
        buf.extend_from_slice(&self.pure_header().serialize());

        if mode != SerializeMode::KawpowInput && format.has_height(self.timestamp) {
            encode::put_u32(&mut buf, self.height);
        }

        if mode == SerializeMode::Full && self.is_auxpow() {
            if let Some(auxpow) = &self.auxpow {
                auxpow.encode(&mut buf);
            }
        }

        buf
    }

    /// Decode a fully serialized header
    pub fn decode<R: Read>(reader: &mut R, format: &HeaderFormat) -> Result<Self, CodecError> {
        let pure = PureBlockHeader::decode(reader)?;

        let height = if format.has_height(pure.timestamp) {
            reader.read_u32::<LittleEndian>()?
        } else {
            0
        };

        let auxpow = if pure.is_auxpow() {
            Some(Box::new(AuxPow::decode(reader)?))
        } else {
            None
        };

        Ok(BlockHeader {
            version: pure.version,
            prev_block_hash: pure.prev_block_hash,
            merkle_root: pure.merkle_root,
            timestamp: pure.timestamp,
            bits: pure.bits,
            nonce: pure.nonce,
            height,
            auxpow,
        })
    }

    /// Decode a header that must span exactly `bytes`
    pub fn from_bytes(bytes: &[u8], format: &HeaderFormat) -> Result<Self, HeaderError> {
        let mut reader = bytes;
        let header = Self::decode(&mut reader, format)?;
        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.len()).into());
        }
        Ok(header)
    }

    /// Block identity hash: double SHA256 of the hash-mode serialization
    pub fn hash(&self, format: &HeaderFormat) -> Hash {
        sha256d(&self.serialize(SerializeMode::Hash, format))
    }

    /// Get the block timestamp as a DateTime
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp as i64, 0)
            .single()
            .unwrap_or_default()
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockHeader {{ version: {:#010x}, prev: {}, merkle: {}, time: {}, bits: {:08x}, nonce: {}, height: {}, auxpow: {} }}",
            self.version,
            hex::encode(&self.prev_block_hash[0..4]),
            hex::encode(&self.merkle_root[0..4]),
            self.datetime().format("%Y-%m-%d %H:%M:%S"),
            self.bits,
            self.nonce,
            self.height,
            self.auxpow.is_some()
        )
    }
}

/// Block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,

    /// Transactions
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
        }
    }

    /// Get the block hash
    pub fn hash(&self, format: &HeaderFormat) -> Hash {
        self.header.hash(format)
    }

    /// Calculate the merkle root of the transactions and whether the tree is mutated
    pub fn calculate_merkle_root(&self) -> (Hash, bool) {
        let txids: Vec<Hash> = self.transactions.iter().map(|tx| tx.txid()).collect();
        merkle_root(&txids)
    }

    /// Check the transaction commitment in the header
    pub fn check_merkle_root(&self) -> Result<(), BlockValidationError> {
        let first = self
            .transactions
            .first()
            .ok_or(BlockValidationError::NoTransactions)?;
        if !first.is_coinbase() {
            return Err(BlockValidationError::InvalidCoinbase(
                "first transaction is not a coinbase".to_string(),
            ));
        }

        let (root, mutated) = self.calculate_merkle_root();
        if mutated {
            return Err(BlockValidationError::MutatedMerkleTree);
        }
        if root != self.header.merkle_root {
            return Err(BlockValidationError::InvalidMerkleRoot);
        }

        Ok(())
    }

    /// Full serialization: header followed by the transactions
    pub fn serialize(&self, format: &HeaderFormat) -> Vec<u8> {
        let mut buf = self.header.serialize(SerializeMode::Full, format);
        encode::put_compact_size(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode(&mut buf);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auxpow::MerkleBranch;
    use crate::transaction::TransactionOutput;

    const ACTIVATION: u32 = 1_581_453_566;

    fn format() -> HeaderFormat {
        HeaderFormat::new(ACTIVATION)
    }

    fn sample_header(timestamp: u32) -> BlockHeader {
        BlockHeader::new(
            version::compose(4, 0xa4),
            [1; 32],
            [2; 32],
            timestamp,
            0x207fffff,
            42,
            1000,
        )
    }

    fn sample_auxpow() -> AuxPow {
        AuxPow {
            coinbase_tx: Transaction::coinbase(vec![1, 2, 3], vec![TransactionOutput::new(1, vec![])]),
            parent_block_hash: [0; 32],
            coinbase_branch: MerkleBranch::default(),
            chain_branch: MerkleBranch::new(vec![[9; 32]], 0),
            parent_block: PureBlockHeader::new(1, [0; 32], [3; 32], 1, 0x207fffff, 0),
        }
    }

    #[test]
    fn test_pure_header_layout() {
        let header = PureBlockHeader::new(0x2000_0004, [0xaa; 32], [0xbb; 32], 0x01020304, 0x1d00ffff, 7);
        let bytes = header.serialize();

        assert_eq!(&bytes[0..4], &[0x04, 0x00, 0x00, 0x20]);
        assert_eq!(&bytes[68..72], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[72..76], &[0xff, 0xff, 0x00, 0x1d]);
        assert_eq!(PureBlockHeader::decode(&mut &bytes[..]).unwrap(), header);
    }

    #[test]
    fn test_height_field_after_activation_only() {
        let before = sample_header(ACTIVATION);
        assert_eq!(before.serialize(SerializeMode::Hash, &format()).len(), 80);

        let after = sample_header(ACTIVATION + 1);
        let bytes = after.serialize(SerializeMode::Hash, &format());
        assert_eq!(bytes.len(), 84);
        assert_eq!(&bytes[80..84], &1000u32.to_le_bytes());

        // The KAWPOW hash input never carries the height
        assert_eq!(after.serialize(SerializeMode::KawpowInput, &format()).len(), 80);
    }

    #[test]
    fn test_height_is_committed_in_hash() {
        let mut header = sample_header(ACTIVATION + 10);
        let hash = header.hash(&format());
        header.height += 1;
        assert_ne!(header.hash(&format()), hash);

        let mut early = sample_header(ACTIVATION - 10);
        let hash = early.hash(&format());
        early.height += 1;
        assert_eq!(early.hash(&format()), hash);
    }

    #[test]
    fn test_full_serialization_carries_auxpow() {
        let mut header = sample_header(ACTIVATION + 5);
        header.set_auxpow(Some(sample_auxpow()));
        assert!(header.is_auxpow());

        let full = header.serialize(SerializeMode::Full, &format());
        let hash_input = header.serialize(SerializeMode::Hash, &format());
        assert!(full.len() > hash_input.len());
        assert_eq!(&full[..hash_input.len()], &hash_input[..]);

        let decoded = BlockHeader::from_bytes(&full, &format()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.auxpow(), Some(&sample_auxpow()));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample_header(100).serialize(SerializeMode::Full, &format());
        bytes.push(0);
        assert!(matches!(
            BlockHeader::from_bytes(&bytes, &format()),
            Err(HeaderError::Codec(CodecError::TrailingBytes(1)))
        ));
    }

    #[test]
    fn test_set_auxpow_toggles_flag() {
        let mut header = sample_header(100);
        header.set_auxpow(Some(sample_auxpow()));
        assert!(header.is_auxpow());
        assert_eq!(header.chain_id(), 0xa4);

        header.set_auxpow(None);
        assert!(!header.is_auxpow());
        assert!(header.auxpow().is_none());
        assert_eq!(header.version(), version::compose(4, 0xa4));
    }

    #[test]
    fn test_set_base_version() {
        let mut header = sample_header(100);
        header.set_base_version(2, 0x1940).unwrap();
        assert_eq!(header.base_version(), 2);
        assert_eq!(header.chain_id(), 0x1940);

        assert!(matches!(
            header.set_base_version(0, 1),
            Err(HeaderError::InvalidBaseVersion(0))
        ));

        header.set_auxpow(Some(sample_auxpow()));
        assert!(matches!(
            header.set_base_version(3, 1),
            Err(HeaderError::AuxPowAttached)
        ));
    }

    #[test]
    fn test_set_chain_id_keeps_auxpow_flag() {
        let mut header = sample_header(100);
        header.set_auxpow(Some(sample_auxpow()));
        header.set_chain_id(0x1940).unwrap();
        assert!(header.is_auxpow());
        assert_eq!(header.chain_id(), 0x1940);
        assert_eq!(header.base_version(), 4);
    }

    #[test]
    fn test_oversized_chain_id_rejected() {
        let mut header = sample_header(100);
        assert!(matches!(
            header.set_chain_id(version::MAX_CHAIN_ID + 1),
            Err(HeaderError::InvalidChainId(0x2000))
        ));
        assert_eq!(header.chain_id(), 0xa4);

        assert!(matches!(
            header.set_base_version(4, -1),
            Err(HeaderError::InvalidChainId(-1))
        ));
        assert_eq!(header.version(), version::compose(4, 0xa4));
    }

    #[test]
    fn test_block_merkle_root() {
        let coinbase = Transaction::coinbase(vec![0x51], vec![TransactionOutput::new(10, vec![])]);
        let mut header = sample_header(100);
        header.merkle_root = coinbase.txid();

        let mut block = Block::new(header, vec![coinbase.clone()]);
        assert!(block.check_merkle_root().is_ok());

        block.header.merkle_root[0] ^= 1;
        assert!(matches!(block.check_merkle_root(), Err(BlockValidationError::InvalidMerkleRoot)));

        let empty = Block::new(sample_header(100), vec![]);
        assert!(matches!(empty.check_merkle_root(), Err(BlockValidationError::NoTransactions)));
    }

    #[test]
    fn test_null_header() {
        assert!(BlockHeader::default().is_null());
        assert!(!sample_header(1).is_null());
    }
}
