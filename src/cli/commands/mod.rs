pub mod batch;
pub mod resolve;
pub mod stats;
pub mod test_upstream;

use crate::config::AppConfig;
use crate::coordinator::DataCoordinator;
use crate::database::Database;
use crate::errors::AppResult;
use crate::types::Resolved;
use crate::upstream::UpstreamClient;
use clap::Args;
use config::ConfigError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Coordinator wired to the real upstream and SQLite store
pub type Coordinator = DataCoordinator<UpstreamClient, Database>;

/// Overrides shared by every command that touches upstream or the store
#[derive(Args, Clone, Debug, Default)]
pub struct ConnectionArgs {
    /// Upstream API endpoint (overrides config)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Database path (overrides config)
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    /// Disable the in-memory response cache
    #[arg(long)]
    pub no_cache: bool,
}

impl ConnectionArgs {
    /// Load configuration from file/environment and apply CLI overrides
    pub fn load_config(&self) -> AppConfig {
        let (mut config, notice) = config_or_defaults(AppConfig::load());
        if let Some(notice) = notice {
            warn!("{}", notice);
            eprintln!("Warning: {}", notice);
        }

        if let Some(endpoint) = &self.endpoint {
            config.api.endpoint = endpoint.clone();
        }
        if let Some(path) = &self.database_path {
            config.database.path = path.clone();
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        config
    }
}

/// Use the loaded configuration, or the defaults plus a notice saying why
fn config_or_defaults(loaded: Result<AppConfig, ConfigError>) -> (AppConfig, Option<String>) {
    match loaded {
        Ok(config) => {
            info!("Configuration loaded successfully");
            (config, None)
        }
        Err(e) => {
            let notice = format!("configuration rejected ({}), using built-in defaults", e);
            (AppConfig::default(), Some(notice))
        }
    }
}

/// Build the coordinator from configuration
pub fn build_coordinator(config: &AppConfig) -> AppResult<Coordinator> {
    let client = UpstreamClient::new(&config.api)?;
    let database = Database::new(&config.database)?;

    info!(
        "Resolving via {} with store at {}",
        config.api.endpoint,
        config.database.path.display()
    );
    Ok(DataCoordinator::from_config(
        config,
        Arc::new(client),
        Arc::new(database),
    ))
}

pub fn print_resolved(resolved: &Resolved) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(resolved)?);
    Ok(())
}
