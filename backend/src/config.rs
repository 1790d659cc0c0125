//! Configuration management for the inventory ledger service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with VETSTOCK_ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Ledger behaviour
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

/// Where stock items and movements are persisted
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Process-local store; state is lost on restart
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    pub storage: StorageBackend,

    /// Budget for acquiring the per-item lock before answering `Busy`
    pub lock_timeout_ms: u64,

    /// Default look-ahead window for expiring-soon alerts
    pub expiring_soon_days: i64,

    /// Page size used when walking ledger history
    pub history_page_size: u32,
}

impl InventoryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Postgres,
            lock_timeout_ms: 2000,
            expiring_soon_days: 30,
            history_page_size: 200,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("VETSTOCK_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("inventory.storage", "postgres")?
            .set_default("inventory.lock_timeout_ms", 2000)?
            .set_default("inventory.expiring_soon_days", 30)?
            .set_default("inventory.history_page_size", 200)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (VETSTOCK_ prefix)
            .add_source(
                Environment::with_prefix("VETSTOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration for tests and local demos
    pub fn in_memory() -> Self {
        Self {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 1,
                min_connections: 0,
                acquire_timeout_secs: 5,
            },
            inventory: InventoryConfig {
                storage: StorageBackend::Memory,
                ..InventoryConfig::default()
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.inventory.storage == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigError::Message(
                "database.url is required when inventory.storage = \"postgres\"".to_string(),
            ));
        }
        if self.inventory.lock_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "inventory.lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.inventory.expiring_soon_days < 0 {
            return Err(ConfigError::Message(
                "inventory.expiring_soon_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_config_is_valid() {
        let config = Config::in_memory();
        assert!(config.validate().is_ok());
        assert_eq!(config.inventory.lock_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = Config::in_memory();
        config.inventory.storage = StorageBackend::Postgres;
        assert!(config.validate().is_err());

        config.database.url = "postgres://localhost/vetstock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_lock_timeout_rejected() {
        let mut config = Config::in_memory();
        config.inventory.lock_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
