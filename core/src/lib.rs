//! BLAST Core Types and Data Structures
//!
//! This module defines the data structures shared by the consensus core:
//! block headers with their version field layout, the auxiliary proof-of-work
//! payload carried by merge-mined headers, and the minimal transaction model
//! needed for coinbase commitments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod auxpow;
pub mod block;
pub mod encode;
pub mod transaction;
pub mod version;

/// Re-export core types
pub use auxpow::{AuxPow, MerkleBranch};
pub use block::{Block, BlockHeader, BlockValidationError, HeaderError, HeaderFormat, PureBlockHeader, SerializeMode};
pub use encode::CodecError;
pub use transaction::{Transaction, TransactionInput, TransactionOutput};

/// Hash type used throughout the system
pub type Hash = [u8; 32];

/// Networks supported by BLAST
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Main production network
    #[serde(rename = "main")]
    Mainnet,
    /// Public test network
    #[serde(rename = "test")]
    Testnet,
    /// Local regression testing
    Regtest,
}

impl Network {
    /// Canonical short name used on the command line and in config files
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
        }
    }

    /// All known networks
    pub fn all() -> [Network; 3] {
        [Network::Mainnet, Network::Testnet, Network::Regtest]
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Network {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Mainnet),
            "test" | "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(CoreError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    #[error("Block validation error: {0}")]
    BlockValidation(#[from] BlockValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] CodecError),
}
