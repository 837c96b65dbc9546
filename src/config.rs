use crate::upstream::retry::{Backoff, RetryPolicy};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded once at startup and never re-read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub app: AppSection,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    pub name: String,
}

/// Upstream blockchain data provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub endpoint: String,
    /// Confirmations after which data is treated as settled for caching
    pub confirmations: u64,
    pub retry_attempts: usize,
    pub timeout_seconds: u64,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    pub initial_ms: u64,
    /// Added per attempt by the linear strategy
    pub step_ms: u64,
    /// Growth factor for the exponential strategy
    pub multiplier: f64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    /// TTL for records with at least `api.confirmations` confirmations
    pub confirmed_ttl_seconds: u64,
    /// None means unbounded (TTL is then the only bound)
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: u32,
    pub connection_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Extra attempts for transient store write failures
    pub store_retries: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://blockchain.info".to_string(),
            confirmations: 6,
            retry_attempts: 3,
            timeout_seconds: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            initial_ms: 200,
            step_ms: 200,
            multiplier: 2.0,
            max_ms: 5_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 60,
            confirmed_ttl_seconds: 3600,
            max_entries: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/blockchain.db"),
            pool_size: 4,
            connection_timeout_seconds: 5,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { store_retries: 1 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection {
                name: "blockchain-info-proxy".to_string(),
            },
            api: ApiConfig::default(),
            cache: CacheConfig::default(),
            database: DatabaseConfig::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Build the retry policy the upstream client runs every fetch under
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff.strategy {
            BackoffStrategy::Fixed => {
                Backoff::Fixed(Duration::from_millis(self.backoff.initial_ms))
            }
            BackoffStrategy::Linear => Backoff::Linear {
                initial: Duration::from_millis(self.backoff.initial_ms),
                step: Duration::from_millis(self.backoff.step_ms),
            },
            BackoffStrategy::Exponential => Backoff::Exponential {
                initial: Duration::from_millis(self.backoff.initial_ms),
                multiplier: self.backoff.multiplier,
                max: Duration::from_millis(self.backoff.max_ms),
            },
        };

        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.timeout_seconds),
            backoff,
        )
    }
}

impl AppConfig {
    /// Load configuration for the environment named by `ENV` (default `dev`)
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for(&environment)
    }

    /// Load configuration from defaults, `config.<environment>.{yaml,toml,json}`
    /// and `BCP_*` environment variables. Environment variables take precedence.
    pub fn load_for(environment: &str) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let config = Config::builder()
            // Start with default values
            .set_default("app.name", defaults.app.name)?
            .set_default("api.endpoint", defaults.api.endpoint)?
            .set_default("api.confirmations", defaults.api.confirmations)?
            .set_default("api.retry_attempts", defaults.api.retry_attempts as i64)?
            .set_default("api.timeout_seconds", defaults.api.timeout_seconds)?
            .set_default("api.backoff.strategy", "exponential")?
            .set_default("api.backoff.initial_ms", defaults.api.backoff.initial_ms)?
            .set_default("api.backoff.step_ms", defaults.api.backoff.step_ms)?
            .set_default("api.backoff.multiplier", defaults.api.backoff.multiplier)?
            .set_default("api.backoff.max_ms", defaults.api.backoff.max_ms)?
            .set_default("cache.enabled", defaults.cache.enabled)?
            .set_default("cache.ttl_seconds", defaults.cache.ttl_seconds)?
            .set_default(
                "cache.confirmed_ttl_seconds",
                defaults.cache.confirmed_ttl_seconds,
            )?
            .set_default(
                "database.path",
                defaults.database.path.to_string_lossy().to_string(),
            )?
            .set_default("database.pool_size", defaults.database.pool_size as i64)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default(
                "coordinator.store_retries",
                defaults.coordinator.store_retries as i64,
            )?
            // Load from config.<env>.* if it exists
            .add_source(File::with_name(&format!("config.{}", environment)).required(false))
            // BCP_API__ENDPOINT, BCP_DATABASE__PATH, ... override file settings
            .add_source(
                Environment::with_prefix("BCP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.retry_attempts == 0 {
            return Err(ConfigError::Message(
                "api.retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "api.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        // Every strategy must wait between attempts
        let backoff = &self.api.backoff;
        if backoff.initial_ms == 0 {
            return Err(ConfigError::Message(
                "api.backoff.initial_ms must be greater than 0".to_string(),
            ));
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(ConfigError::Message(format!(
                "api.backoff.multiplier must be a finite number >= 1.0, got {}",
                backoff.multiplier
            )));
        }
        if backoff.max_ms < backoff.initial_ms {
            return Err(ConfigError::Message(
                "api.backoff.max_ms must not be below api.backoff.initial_ms".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Message(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(ConfigError::Message(
                "cache.max_entries must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Load config, falling back to built-in defaults when no usable source exists
    pub fn get_defaults() -> Self {
        Self::load().unwrap_or_default()
    }
}
