use super::ConnectionArgs;
use crate::errors::{AppError, AppResult};
use crate::upstream::UpstreamClient;
use clap::Args;
use tracing::{error, info};

/// Test upstream API connectivity
#[derive(Args)]
pub struct TestUpstreamCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl TestUpstreamCommand {
    pub async fn run(&self) -> AppResult<()> {
        info!("=== Testing Upstream Connection ===");

        let config = self.connection.load_config();
        info!("Testing connection to: {}", config.api.endpoint);
        info!(
            "Retry attempts: {}, timeout: {}s",
            config.api.retry_attempts, config.api.timeout_seconds
        );

        let client = UpstreamClient::new(&config.api)?;
        match client.test_connection().await {
            Ok(height) => {
                println!("Upstream connection test PASSED");
                println!("Chain tip height: {}", height);
                Ok(())
            }
            Err(e) => {
                error!("Upstream connection test failed: {}", e);
                println!("Upstream connection test FAILED");
                println!("Error: {}", e);
                println!("\nTroubleshooting tips:");
                println!("1. Check network access to {}", config.api.endpoint);
                println!("2. Verify api.endpoint in config or BCP_API__ENDPOINT");
                println!("3. Increase api.timeout_seconds on slow links");

                Err(AppError::Upstream(e))
            }
        }
    }
}
