//! Chain parameters for BLAST networks
//!
//! Every consensus constant lives in one immutable `ChainParams` value per
//! network. The three standard instances are built lazily on first use and
//! shared for the lifetime of the process; components always receive them by
//! reference. Adjusting a parameter set for deterministic tests goes through
//! the builder in `testing`, never through setters on this type.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use blast_core::{
    Block, BlockHeader, CoreError, Hash, HeaderFormat, Network, Transaction, TransactionOutput,
};

use crate::arith::U256;

/// Smallest currency unit per coin
pub const COIN: i64 = 100_000_000;

/// Start time meaning the deployment is active from genesis
pub const ALWAYS_ACTIVE: i64 = -1;

/// Start time meaning the deployment can never activate
pub const NEVER_ACTIVE: i64 = -2;

/// Timeout meaning the deployment never expires
pub const NO_TIMEOUT: i64 = i64::MAX;

const GENESIS_MESSAGE: &str =
    "The Merkle 03/Dec/2017 Three Crypto Projects Attempting to Penetrate the Video Game Industry";

const GENESIS_OUTPUT_KEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

/// Chain parameter errors
#[derive(Debug, Error)]
pub enum ParamsError {
    /// Network name is not one of main, test or regtest
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

impl From<CoreError> for ParamsError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownNetwork(name) => ParamsError::UnknownNetwork(name),
            other => ParamsError::UnknownNetwork(other.to_string()),
        }
    }
}

/// Soft-fork deployments tracked through version bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeploymentPos {
    /// Dummy deployment used by tests
    TestDummy,
    /// Asset layer
    Assets,
    /// Relative lock-time (BIP68, BIP112, BIP113)
    Csv,
    /// Segregated witness
    Segwit,
}

impl DeploymentPos {
    pub const ALL: [DeploymentPos; 4] = [
        DeploymentPos::TestDummy,
        DeploymentPos::Assets,
        DeploymentPos::Csv,
        DeploymentPos::Segwit,
    ];

    /// Index into the deployment table
    pub fn index(&self) -> usize {
        match self {
            DeploymentPos::TestDummy => 0,
            DeploymentPos::Assets => 1,
            DeploymentPos::Csv => 2,
            DeploymentPos::Segwit => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeploymentPos::TestDummy => "testdummy",
            DeploymentPos::Assets => "assets",
            DeploymentPos::Csv => "csv",
            DeploymentPos::Segwit => "segwit",
        }
    }
}

impl fmt::Display for DeploymentPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One version-bits deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Version bit used for signaling (0..=28)
    pub bit: u8,

    /// Median time past at which signaling may begin
    pub start_time: i64,

    /// Median time past at which an unfinished deployment fails
    pub timeout: i64,
}

impl Deployment {
    pub const fn new(bit: u8, start_time: i64, timeout: i64) -> Self {
        Deployment {
            bit,
            start_time,
            timeout,
        }
    }

    /// Bit mask of this deployment within the version field
    pub fn mask(&self) -> i32 {
        1i32 << self.bit
    }
}

/// Consensus parameters of one network
#[derive(Debug, Clone, Serialize)]
pub struct ChainParams {
    pub(crate) network: Network,

    /// Easiest allowed target
    pub(crate) pow_limit: U256,
    pub(crate) pow_target_timespan: i64,
    pub(crate) pow_target_spacing: i64,
    pub(crate) allow_min_difficulty_blocks: bool,
    pub(crate) no_retargeting: bool,

    pub(crate) rule_change_activation_threshold: u32,
    pub(crate) miner_confirmation_window: u32,
    pub(crate) deployments: [Deployment; 4],

    pub(crate) auxpow_chain_id: i32,
    pub(crate) alternate_chain_id: i32,
    pub(crate) chain_id_upgrade_height: u32,
    pub(crate) strict_chain_id: bool,
    pub(crate) auxpow_start_height: u32,

    pub(crate) x16rv2_activation_time: u32,
    pub(crate) kawpow_activation_time: u32,

    pub(crate) bip34_enabled: bool,
    pub(crate) bip65_enabled: bool,
    pub(crate) bip66_enabled: bool,
    pub(crate) segwit_enabled: bool,
    pub(crate) csv_enabled: bool,

    pub(crate) genesis: Block,
}

static MAIN_PARAMS: Lazy<ChainParams> = Lazy::new(ChainParams::main);
static TEST_PARAMS: Lazy<ChainParams> = Lazy::new(ChainParams::test);
static REGTEST_PARAMS: Lazy<ChainParams> = Lazy::new(ChainParams::regtest);

impl ChainParams {
    /// Shared parameters for `network`
    pub fn get(network: Network) -> &'static ChainParams {
        match network {
            Network::Mainnet => &MAIN_PARAMS,
            Network::Testnet => &TEST_PARAMS,
            Network::Regtest => &REGTEST_PARAMS,
        }
    }

    /// Shared parameters for a network name (`main`, `test` or `regtest`)
    pub fn from_name(name: &str) -> Result<&'static ChainParams, ParamsError> {
        let network: Network = name.parse()?;
        Ok(Self::get(network))
    }

    /// Build a fresh, independently owned parameter set
    pub fn for_network(network: Network) -> ChainParams {
        match network {
            Network::Mainnet => Self::main(),
            Network::Testnet => Self::test(),
            Network::Regtest => Self::regtest(),
        }
    }

    fn main() -> Self {
        ChainParams {
            network: Network::Mainnet,
            pow_limit: !U256::zero() >> 20,
            pow_target_timespan: 32 * 60,
            pow_target_spacing: 32,
            allow_min_difficulty_blocks: false,
            no_retargeting: false,
            rule_change_activation_threshold: 54, // 90% of 60
            miner_confirmation_window: 60,
            deployments: [
                Deployment::new(28, 1199145601, 1230767999),
                Deployment::new(6, 9999999999, 9999999999),
                Deployment::new(0, 1512550966, 1519146928),
                Deployment::new(1, 1512550966, 1519146928),
            ],
            auxpow_chain_id: 0x1940,
            alternate_chain_id: 0x00a4,
            chain_id_upgrade_height: 796_000,
            strict_chain_id: false,
            auxpow_start_height: 796_000,
            x16rv2_activation_time: 1569945600,
            kawpow_activation_time: 2581453566,
            bip34_enabled: true,
            bip65_enabled: false,
            bip66_enabled: true,
            segwit_enabled: false,
            csv_enabled: true,
            genesis: create_genesis_block(1512550966, 476339731, 0x1d00ffff, 1, COIN),
        }
    }

    fn test() -> Self {
        ChainParams {
            network: Network::Testnet,
            pow_limit: !U256::zero() >> 32,
            pow_target_timespan: 32 * 60,
            pow_target_spacing: 32,
            allow_min_difficulty_blocks: false,
            no_retargeting: false,
            rule_change_activation_threshold: 54,
            miner_confirmation_window: 60,
            deployments: [
                Deployment::new(28, 1199145601, 1230767999),
                Deployment::new(6, 1553835600, 1584403653),
                Deployment::new(0, 1552781253, 1584403653),
                Deployment::new(1, 1552781253, 1584403653),
            ],
            auxpow_chain_id: 0x1940,
            alternate_chain_id: 0x00a4,
            chain_id_upgrade_height: 30,
            strict_chain_id: false,
            auxpow_start_height: 30,
            x16rv2_activation_time: 1567533600,
            kawpow_activation_time: 2581453566,
            bip34_enabled: true,
            bip65_enabled: false,
            bip66_enabled: true,
            segwit_enabled: false,
            csv_enabled: true,
            genesis: create_genesis_block(1552795319, 497372947, 0x1d00ffff, 1, COIN),
        }
    }

    fn regtest() -> Self {
        ChainParams {
            network: Network::Regtest,
            pow_limit: !U256::zero() >> 1,
            pow_target_timespan: 32 * 60,
            pow_target_spacing: 32,
            allow_min_difficulty_blocks: true,
            no_retargeting: true,
            rule_change_activation_threshold: 24, // 75% of 32
            miner_confirmation_window: 32,
            deployments: [
                Deployment::new(28, 0, 999999999999),
                Deployment::new(6, 0, 999999999999),
                Deployment::new(0, 0, 999999999999),
                Deployment::new(1, 0, 999999999999),
            ],
            auxpow_chain_id: 0x1940,
            alternate_chain_id: 0x00a4,
            chain_id_upgrade_height: 0,
            strict_chain_id: false,
            auxpow_start_height: 0,
            x16rv2_activation_time: 1569931200,
            kawpow_activation_time: 1581453566,
            bip34_enabled: true,
            bip65_enabled: true,
            bip66_enabled: true,
            segwit_enabled: false,
            csv_enabled: true,
            genesis: create_genesis_block(1487000020, 0, 0x207fffff, 1, COIN),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn pow_limit(&self) -> U256 {
        self.pow_limit
    }

    /// Seconds one retarget period should last
    pub fn pow_target_timespan(&self) -> i64 {
        self.pow_target_timespan
    }

    /// Seconds between blocks
    pub fn pow_target_spacing(&self) -> i64 {
        self.pow_target_spacing
    }

    /// Blocks per retarget period
    pub fn difficulty_adjustment_interval(&self) -> i64 {
        self.pow_target_timespan / self.pow_target_spacing
    }

    pub fn allow_min_difficulty_blocks(&self) -> bool {
        self.allow_min_difficulty_blocks
    }

    pub fn no_retargeting(&self) -> bool {
        self.no_retargeting
    }

    pub fn rule_change_activation_threshold(&self) -> u32 {
        self.rule_change_activation_threshold
    }

    pub fn miner_confirmation_window(&self) -> u32 {
        self.miner_confirmation_window
    }

    pub fn deployment(&self, pos: DeploymentPos) -> &Deployment {
        &self.deployments[pos.index()]
    }

    pub fn auxpow_chain_id(&self) -> i32 {
        self.auxpow_chain_id
    }

    pub fn alternate_chain_id(&self) -> i32 {
        self.alternate_chain_id
    }

    pub fn chain_id_upgrade_height(&self) -> u32 {
        self.chain_id_upgrade_height
    }

    pub fn strict_chain_id(&self) -> bool {
        self.strict_chain_id
    }

    /// First height at which merge-mined headers are accepted
    pub fn auxpow_start_height(&self) -> u32 {
        self.auxpow_start_height
    }

    /// Whether `chain_id` may appear on a header at `height`
    pub fn accepts_chain_id(&self, chain_id: i32, height: u32) -> bool {
        chain_id == self.auxpow_chain_id
            || (height >= self.chain_id_upgrade_height && chain_id == self.alternate_chain_id)
    }

    /// Chain ID new headers at `height` should carry
    pub fn chain_id_at(&self, height: u32) -> i32 {
        if height >= self.chain_id_upgrade_height {
            self.alternate_chain_id
        } else {
            self.auxpow_chain_id
        }
    }

    pub fn x16rv2_activation_time(&self) -> u32 {
        self.x16rv2_activation_time
    }

    pub fn kawpow_activation_time(&self) -> u32 {
        self.kawpow_activation_time
    }

    /// Header layout on this network
    pub fn header_format(&self) -> HeaderFormat {
        HeaderFormat::new(self.kawpow_activation_time)
    }

    pub fn bip34_enabled(&self) -> bool {
        self.bip34_enabled
    }

    pub fn bip65_enabled(&self) -> bool {
        self.bip65_enabled
    }

    pub fn bip66_enabled(&self) -> bool {
        self.bip66_enabled
    }

    pub fn segwit_enabled(&self) -> bool {
        self.segwit_enabled
    }

    pub fn csv_enabled(&self) -> bool {
        self.csv_enabled
    }

    pub fn genesis_block(&self) -> &Block {
        &self.genesis
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis.hash(&self.header_format())
    }
}

/// Build a genesis block with the network's fixed coinbase
pub fn create_genesis_block(time: u32, nonce: u32, bits: u32, version: i32, reward: i64) -> Block {
    let mut script_sig = vec![0x04, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04];
    let message = GENESIS_MESSAGE.as_bytes();
    // OP_PUSHDATA1
    script_sig.push(0x4c);
    script_sig.push(message.len() as u8);
    script_sig.extend_from_slice(message);

    // <pubkey> OP_CHECKSIG
    let key = hex::decode(GENESIS_OUTPUT_KEY).unwrap_or_default();
    let mut script_pubkey = Vec::with_capacity(key.len() + 2);
    script_pubkey.push(key.len() as u8);
    script_pubkey.extend_from_slice(&key);
    script_pubkey.push(0xac);

    let coinbase = Transaction::coinbase(script_sig, vec![TransactionOutput::new(reward, script_pubkey)]);
    let merkle_root = coinbase.txid();

    let header = BlockHeader::new(version, [0u8; 32], merkle_root, time, bits, nonce, 0);
    Block::new(header, vec![coinbase])
}
