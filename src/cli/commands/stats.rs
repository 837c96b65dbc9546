use super::ConnectionArgs;
use crate::database::{Database, StatisticsOperations};
use crate::errors::AppResult;
use clap::Args;
use tracing::info;

/// Show persisted record counts
#[derive(Args)]
pub struct StatsCommand {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl StatsCommand {
    pub fn run(&self) -> AppResult<()> {
        let config = self.connection.load_config();
        info!("Reading statistics from {}", config.database.path.display());

        let database = Database::new(&config.database)?;
        let counts = database.get_record_counts()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&counts)?);
            return Ok(());
        }

        println!("Database: {}", config.database.path.display());
        println!("  Blocks:            {}", counts.blocks);
        println!("  Transactions:      {}", counts.transactions);
        println!("  Address snapshots: {}", counts.addresses);
        match counts.latest_height {
            Some(height) => println!("  Latest height:     {}", height),
            None => println!("  Latest height:     (none)"),
        }
        Ok(())
    }
}
