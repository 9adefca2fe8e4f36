//! BLAST consensus inspector - Main Entry Point
//!
//! A developer tool over the consensus crates: prints a network's chain
//! parameters, re-derives and checks the genesis block, and decodes raw
//! headers to show their version fields, proof-of-work algorithm and AuxPow
//! structure.

use clap::{Parser, Subcommand};
use log::{debug, error, info};
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;
use std::process;

use blast_consensus::{select_algorithm, ChainParams, ConsensusEngine, DeploymentPos};
use blast_core::{BlockHeader, Network, SerializeMode};
use blast_util::{format_timestamp, hash_to_hex, hex_to_bytes};

/// Command line arguments for the BLAST inspector
#[derive(Parser)]
#[clap(name = "blast")]
#[clap(about = "BLAST - inspect consensus parameters and block headers")]
struct Cli {
    /// Sets a custom config file
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Network to use (main, test, regtest)
    #[clap(long)]
    network: Option<String>,

    /// Verbosity level (0-5)
    #[clap(short, long)]
    verbosity: Option<u8>,

    /// Subcommands
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the chain parameters as JSON
    Params,
    /// Rebuild the genesis block and check it against the published hash
    Genesis,
    /// Decode a hex-encoded header
    Inspect {
        /// Fully serialized header, including any AuxPow
        #[clap(value_name = "HEX")]
        header: String,
        /// Also check proof of work as if the header were at this height
        #[clap(long)]
        height: Option<u32>,
    },
}

/// Settings layered from the config file and `BLAST_*` environment variables
#[derive(Debug, Deserialize)]
#[serde(default)]
struct Settings {
    network: String,
    verbosity: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            network: Network::default().name().to_string(),
            verbosity: 2,
        }
    }
}

impl Settings {
    fn load(path: Option<&PathBuf>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        builder
            .add_source(config::Environment::with_prefix("BLAST"))
            .build()?
            .try_deserialize()
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

fn print_params(params: &ChainParams) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(params)?);
    Ok(())
}

fn check_genesis(engine: &ConsensusEngine) -> Result<(), Box<dyn Error>> {
    let params = engine.params();
    let format = params.header_format();
    let genesis = params.genesis_block();

    let hash = genesis.hash(&format);
    let (merkle_root, _) = genesis.calculate_merkle_root();

    println!("network:     {}", params.network());
    println!("hash:        {}", hash_to_hex(&hash));
    println!("merkle root: {}", hash_to_hex(&merkle_root));
    println!("time:        {}", format_timestamp(genesis.header.timestamp as i64));
    println!("bits:        {:08x}", genesis.header.bits);

    genesis.check_merkle_root()?;
    engine.check_header(&genesis.header, None)?;

    info!("Genesis block of {} verified", params.network());
    Ok(())
}

fn inspect_header(engine: &ConsensusEngine, raw: &str, height: Option<u32>) -> Result<(), Box<dyn Error>> {
    let params = engine.params();
    let format = params.header_format();
    let bytes = hex_to_bytes(raw.trim())?;
    let header = BlockHeader::from_bytes(&bytes, &format)?;

    debug!("Decoded {}", header);

    let algorithm = select_algorithm(header.timestamp, params);
    println!("hash:         {}", hash_to_hex(&header.hash(&format)));
    println!("version:      {:#010x}", header.version());
    println!("base version: {}", header.base_version());
    println!("chain id:     {:#x}", header.chain_id());
    println!("auxpow flag:  {}", header.is_auxpow());
    println!("prev block:   {}", hash_to_hex(&header.prev_block_hash));
    println!("merkle root:  {}", hash_to_hex(&header.merkle_root));
    println!("time:         {}", format_timestamp(header.timestamp as i64));
    println!("bits:         {:08x}", header.bits);
    println!("nonce:        {}", header.nonce);
    println!("algorithm:    {}", algorithm);
    if format.has_height(header.timestamp) {
        println!("height:       {}", header.height);
    }

    for pos in DeploymentPos::ALL {
        let deployment = params.deployment(pos);
        if blast_core::version::signals_bit(header.version(), deployment.bit) {
            println!("signals:      {} (bit {})", pos, deployment.bit);
        }
    }

    if let Some(auxpow) = header.auxpow() {
        let parent = &auxpow.parent_block;
        println!("auxpow:");
        println!("  parent hash:     {}", hash_to_hex(&parent.hash()));
        println!("  parent chain id: {:#x}", parent.chain_id());
        println!("  coinbase size:   {} bytes", auxpow.coinbase_tx.serialize().len());
        println!("  coinbase branch: {} levels", auxpow.coinbase_branch.len());
        println!(
            "  chain branch:    {} levels, index {}",
            auxpow.chain_branch.len(),
            auxpow.chain_branch.side_mask
        );
    }

    debug!(
        "Hash-mode serialization is {} bytes",
        header.serialize(SerializeMode::Hash, &format).len()
    );

    if let Some(height) = height {
        engine.check_contextual_version(&header, height)?;
        engine.check_proof_of_work(&header, height)?;
        println!("proof of work: valid at height {}", height);
    }

    Ok(())
}

fn run(cli: Cli, settings: Settings) -> Result<(), Box<dyn Error>> {
    let network: Network = cli.network.as_deref().unwrap_or(&settings.network).parse()?;
    info!("Using network {}", network);

    let engine = ConsensusEngine::for_network(network);

    match cli.command {
        Commands::Params => print_params(engine.params()),
        Commands::Genesis => check_genesis(&engine),
        Commands::Inspect { header, height } => inspect_header(&engine, &header, height),
    }
}

/// Application entry point
fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Initialize logging
    init_logging(cli.verbosity.unwrap_or(settings.verbosity));

    if let Err(e) = run(cli, settings) {
        error!("{}", e);
        process::exit(1);
    }
}
