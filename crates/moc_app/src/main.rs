mod commands;
mod context;

use std::path::PathBuf;

use alloy_primitives::Address;
use anyhow::Result;
use clap::{Parser, Subcommand};
use moc_contracts::BatchMode;
use moc_core::config::MocConfig;
use moc_core::{Network, logging};
use tracing::{error, info};

use crate::context::AppContext;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "moc", version, about = "Deploy and drive the MapOfCrypto storefront contracts")]
struct Cli {
    /// Config file (defaults to ~/.mapofcrypto/config.json)
    #[arg(long, global = true, env = "MOC_CONFIG")]
    config: Option<PathBuf>,

    /// Network to use: localhost, kovan, mainnet or memory
    #[arg(long, global = true, env = "MOC_NETWORK")]
    network: Option<Network>,

    /// Override the network's RPC endpoint
    #[arg(long, global = true, env = "MOC_RPC_URL")]
    rpc_url: Option<String>,

    /// Sending identity (must be unlocked on the node)
    #[arg(long, global = true)]
    from: Option<Address>,

    /// Directory of compiled contract artifacts
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy contracts in plan order and record their addresses
    Deploy {
        /// TOML plan; the built-in Operator → MapOfCrypto plan when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Attach to recorded deployments whose bytecode is unchanged
        #[arg(long)]
        reuse: bool,
    },
    /// Issue a batch of purchase requests
    Purchases {
        #[arg(long, default_value_t = 20)]
        count: usize,
        #[arg(long, default_value_t = 1)]
        merchant: u64,
        #[arg(long, default_value_t = 1)]
        product: u64,
        /// confirm: wait for each receipt; accept: wait for receipts at the end
        #[arg(long, default_value_t = BatchMode::AwaitConfirmation)]
        mode: BatchMode,
        /// Storefront address (defaults to the recorded deployment)
        #[arg(long)]
        address: Option<Address>,
    },
    /// Buy one product and report the outcome
    Buy {
        #[arg(long)]
        merchant: u64,
        #[arg(long)]
        product: u64,
        #[arg(long)]
        address: Option<Address>,
    },
    /// Show a contract kind's interface
    Interface { kind: String },
    /// List recorded deployments for the network
    Addresses,
}

fn load_config(cli: &Cli) -> Result<MocConfig> {
    let mut config = match &cli.config {
        Some(path) => MocConfig::load_or_default(path),
        None => MocConfig::load()?,
    };
    if let Some(network) = cli.network {
        config.network = network;
    }
    if let Some(url) = &cli.rpc_url {
        config.rpc_url = Some(url.clone());
    }
    if let Some(from) = cli.from {
        config.deployer = Some(from.to_string());
    }
    if let Some(dir) = &cli.artifacts {
        config.artifacts_dir = Some(dir.clone());
    }
    Ok(config)
}

async fn run(cli: Cli, config: MocConfig) -> Result<()> {
    let ctx = AppContext::connect(config).await?;
    info!(network = %ctx.config.network, identity = %ctx.identity, "Connected");

    match cli.command {
        Command::Deploy { plan, reuse } => commands::deploy(&ctx, plan.as_deref(), reuse).await,
        Command::Purchases {
            count,
            merchant,
            product,
            mode,
            address,
        } => commands::purchases(&ctx, address, merchant, product, count, mode).await,
        Command::Buy {
            merchant,
            product,
            address,
        } => commands::buy(&ctx, address, merchant, product).await,
        Command::Interface { kind } => commands::interface(&ctx, &kind),
        Command::Addresses => commands::addresses(&ctx),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = logging::init_logging(&config.log_level)?;
    info!("Starting moc v{VERSION}");

    run(cli, config)
        .await
        .inspect_err(|e| error!("{e:#}"))
}
