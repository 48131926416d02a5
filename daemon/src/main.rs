//! Tangle daemon: runs an accounting book with its background loops.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tangle_crypto::{Ed25519Verifier, Signer, Wallet};
use tangle_ledger::AccountingBook;
use tangle_types::Address;
use tangle_utils::{init_logging, LogFormat};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;

#[derive(Parser)]
#[command(name = "tangle-daemon", about = "Tangle ledger node daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; CLI
    /// flags and env vars override them.
    #[arg(long, env = "TANGLE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for stores whose path is not configured.
    #[arg(long, env = "TANGLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Hex-encoded 32-byte seed of the node key.
    #[arg(long, env = "TANGLE_NODE_SEED", hide_env_values = true)]
    node_seed: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TANGLE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TANGLE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the node until SIGINT/SIGTERM.
    Run,
    /// Print the node's address and exit.
    Address,
}

impl Cli {
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(seed) = &self.node_seed {
            config.node_seed = Some(seed.clone());
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    cli.apply(&mut config);
    init_logging(config.log_format, &config.log_level)?;

    match cli.command {
        Command::Address => {
            println!("{}", node_wallet(&config)?.address());
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

fn node_wallet(config: &NodeConfig) -> anyhow::Result<Wallet> {
    match &config.node_seed {
        Some(seed) => Wallet::from_hex_seed(seed).context("invalid node seed"),
        None => {
            tracing::warn!("no node seed configured, using an ephemeral key");
            Ok(Wallet::generate()?)
        }
    }
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let wallet = Arc::new(node_wallet(&config)?);
    let address = wallet.address();
    let book = Arc::new(
        AccountingBook::open(config.resolved_ledger(), wallet, Arc::new(Ed25519Verifier))
            .context("failed to open ledger stores")?,
    );

    if let Some(genesis) = &config.genesis {
        let vertex = book
            .create_genesis(
                genesis.subject.clone(),
                genesis.spice(),
                Vec::new(),
                Address::new(genesis.receiver.clone()),
            )
            .context("failed to create genesis")?;
        tracing::info!(vertex = %vertex.hash, receiver = %genesis.receiver, spice = %genesis.spice(), "new dag started");
    } else {
        tracing::info!("no genesis configured, waiting for a dag to be loaded");
    }

    let shutdown = CancellationToken::new();
    let handles = book.run(shutdown.clone())?;
    tracing::info!(node = %address, "tangle node running");

    tokio::select! {
        signal = wait_for_signal() => signal?,
        _ = shutdown.cancelled() => tracing::warn!("background loop requested shutdown"),
    }
    shutdown.cancel();
    for handle in handles {
        handle.await?;
    }

    tracing::info!("tangle daemon exited cleanly");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("received SIGINT, shutting down");
            }
            _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("received SIGINT, shutting down");
    }
    Ok(())
}
