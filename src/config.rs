//! Configuration for the cardroom service.
//!
//! All tunables live in one `CoreConfig` built at startup and handed to the
//! components that need them; nothing in the core reads the environment ad
//! hoc. Supports a TOML file, `CARDROOM_*` environment overrides, and a
//! validation pass.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub storage: StorageConfig,
    pub economy: EconomyConfig,
    pub oracle: OracleConfig,
    pub api: ApiConfig,
}

/// Ledger store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Total attempts (first try included) for an optimistic transaction
    /// before `ConcurrencyConflict` surfaces to the caller.
    pub txn_retry_budget: u32,
}

/// Chip-economy constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Chips granted when a wallet is first opened.
    pub initial_chip_grant: f64,
}

/// External scoring-oracle client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    /// Upper bound on a single oracle call.
    pub timeout_ms: u64,
    /// Attempts per bet before the bet is cancelled.
    pub max_attempts: u32,
}

/// HTTP adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./cardroom_data".to_string(),
            txn_retry_budget: 3,
        }
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            initial_chip_grant: 1000.0,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            timeout_ms: 5_000,
            max_attempts: 2,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Configuration loader with environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path.
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables.
    pub fn load(&self) -> Result<CoreConfig, ConfigError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            CoreConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<CoreConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Load(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut CoreConfig) -> Result<(), ConfigError> {
        if let Ok(dir) = env::var("CARDROOM_DATA_DIR") {
            config.storage.data_dir = dir;
        }
        if let Ok(chips) = env::var("CARDROOM_INITIAL_CHIPS") {
            config.economy.initial_chip_grant =
                chips.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "CARDROOM_INITIAL_CHIPS".to_string(),
                    value: chips,
                    reason: "not a number".to_string(),
                })?;
        }
        if let Ok(url) = env::var("CARDROOM_ORACLE_URL") {
            config.oracle.base_url = url;
        }
        if let Ok(timeout) = env::var("CARDROOM_ORACLE_TIMEOUT_MS") {
            config.oracle.timeout_ms =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "CARDROOM_ORACLE_TIMEOUT_MS".to_string(),
                    value: timeout,
                    reason: "not a number of milliseconds".to_string(),
                })?;
        }
        if let Ok(port) = env::var("CARDROOM_API_PORT") {
            config.api.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "CARDROOM_API_PORT".to_string(),
                value: port,
                reason: "invalid port number".to_string(),
            })?;
        }
        if let Ok(enabled) = env::var("CARDROOM_API_ENABLED") {
            config.api.enabled = enabled.parse().map_err(|_| ConfigError::InvalidValue {
                field: "CARDROOM_API_ENABLED".to_string(),
                value: enabled,
                reason: "invalid boolean value".to_string(),
            })?;
        }

        Ok(())
    }

    fn validate(&self, config: &CoreConfig) -> Result<(), ConfigError> {
        if config.storage.data_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".to_string(),
                value: String::new(),
                reason: "data directory cannot be empty".to_string(),
            });
        }

        if config.storage.txn_retry_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "storage.txn_retry_budget".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        if config.economy.initial_chip_grant < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "economy.initial_chip_grant".to_string(),
                value: config.economy.initial_chip_grant.to_string(),
                reason: "grant cannot be negative".to_string(),
            });
        }

        if config.oracle.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "oracle.base_url".to_string(),
                value: String::new(),
                reason: "oracle URL cannot be empty".to_string(),
            });
        }

        if config.oracle.timeout_ms < 100 {
            return Err(ConfigError::InvalidValue {
                field: "oracle.timeout_ms".to_string(),
                value: config.oracle.timeout_ms.to_string(),
                reason: "timeout must be at least 100ms".to_string(),
            });
        }

        if config.oracle.max_attempts == 0 || config.oracle.max_attempts > 10 {
            return Err(ConfigError::InvalidValue {
                field: "oracle.max_attempts".to_string(),
                value: config.oracle.max_attempts.to_string(),
                reason: "attempts must be between 1 and 10".to_string(),
            });
        }

        if config.api.enabled && config.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.port".to_string(),
                value: "0".to_string(),
                reason: "API port cannot be zero when API is enabled".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &CoreConfig, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::Save(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::Save(format!("failed to write to {}: {}", path, e)))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file with defaults.
pub fn generate_sample_config(path: &str) -> Result<(), ConfigError> {
    let config = CoreConfig::default();
    ConfigLoader::new().save(&config, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.economy.initial_chip_grant, 1000.0);
        assert!(config.api.enabled);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = CoreConfig::default();

        assert!(loader.validate(&config).is_ok());

        config.oracle.timeout_ms = 10;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let loader = ConfigLoader::new();
        let mut config = CoreConfig::default();
        config.storage.txn_retry_budget = 0;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_save_and_load_config() -> Result<(), ConfigError> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = CoreConfig::default();
        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;

        assert_eq!(loaded.api.port, original.api.port);
        assert_eq!(loaded.oracle.base_url, original.oracle.base_url);
        assert_eq!(
            loaded.economy.initial_chip_grant,
            original.economy.initial_chip_grant
        );

        Ok(())
    }
}
