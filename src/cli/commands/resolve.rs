use super::{build_coordinator, print_resolved, ConnectionArgs};
use crate::errors::AppResult;
use crate::types::BlockchainQuery;
use clap::Args;
use tracing::info;

async fn resolve_and_print(connection: &ConnectionArgs, query: BlockchainQuery) -> AppResult<()> {
    let config = connection.load_config();
    let coordinator = build_coordinator(&config)?;

    info!("Resolving {}", query);
    let resolved = coordinator.resolve(&query).await?;
    if resolved.source.is_stale() {
        eprintln!("Warning: upstream unavailable, serving persisted data");
    }
    print_resolved(&resolved)
}

/// Resolve the current chain tip
#[derive(Args)]
pub struct LatestBlockCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl LatestBlockCommand {
    pub async fn run(&self) -> AppResult<()> {
        resolve_and_print(&self.connection, BlockchainQuery::latest_block()).await
    }
}

/// Resolve a block by hash or height
#[derive(Args)]
pub struct BlockCommand {
    /// Block hash, or a height when all digits
    pub key: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl BlockCommand {
    pub async fn run(&self) -> AppResult<()> {
        let query = BlockchainQuery::block(&self.key)?;
        resolve_and_print(&self.connection, query).await
    }
}

/// Resolve a transaction by txid
#[derive(Args)]
pub struct TxCommand {
    /// Transaction ID
    pub txid: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl TxCommand {
    pub async fn run(&self) -> AppResult<()> {
        let query = BlockchainQuery::transaction(&self.txid)?;
        resolve_and_print(&self.connection, query).await
    }
}

/// Resolve an address summary
#[derive(Args)]
pub struct AddressCommand {
    /// Bitcoin address
    pub address: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl AddressCommand {
    pub async fn run(&self) -> AppResult<()> {
        let query = BlockchainQuery::address(&self.address)?;
        resolve_and_print(&self.connection, query).await
    }
}
