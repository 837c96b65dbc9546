use crate::errors::AppResult;
use clap::{Parser, Subcommand};

pub mod commands;

/// Bitcoin blockchain read-through proxy
#[derive(Parser)]
#[command(name = "blockchain-info-proxy")]
#[command(about = "Cached, persisted read-through access to blockchain.info data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the latest block
    LatestBlock(commands::resolve::LatestBlockCommand),
    /// Resolve a block by hash or height
    Block(commands::resolve::BlockCommand),
    /// Resolve a transaction by txid
    Tx(commands::resolve::TxCommand),
    /// Resolve an address summary
    Address(commands::resolve::AddressCommand),
    /// Resolve queries from a file or stdin concurrently
    Batch(commands::batch::BatchCommand),
    /// Test upstream API connectivity
    TestUpstream(commands::test_upstream::TestUpstreamCommand),
    /// Show persisted record counts
    Stats(commands::stats::StatsCommand),
}

pub async fn run() -> AppResult<()> {
    // Uses RUST_LOG environment variable (defaults to "error" if not set)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::LatestBlock(command) => command.run().await,
        Commands::Block(command) => command.run().await,
        Commands::Tx(command) => command.run().await,
        Commands::Address(command) => command.run().await,
        Commands::Batch(command) => command.run().await,
        Commands::TestUpstream(command) => command.run().await,
        Commands::Stats(command) => command.run(),
    }
}
