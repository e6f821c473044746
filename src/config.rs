//! Node configuration
//!
//! Read from `config.toml` (or the file named by `SPW_CONFIG`). Every field
//! has a default, so a missing file or a partial file is fine.

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::path::{Path, PathBuf};

use crate::blockchain::crypto::{derive_address, derive_key, is_valid_address, Address};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SPW_CONFIG";

/// Config file read when `SPW_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Seed phrase of the founder wallet credited by the genesis block
pub const FOUNDER_SEED_PHRASE: &str = "creator-wallet-seed-phrase";

/// Largest difficulty a SHA-256 hex digest can express
const MAX_DIFFICULTY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero hex characters required in a mined block hash
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
    /// Amount credited to the founder by the genesis block
    #[serde(default = "default_initial_supply")]
    pub initial_supply: f64,
    #[serde(default = "default_founder_address")]
    pub founder_address: String,
    /// Reject submitted transactions without a valid ed25519 signature
    #[serde(default = "default_true")]
    pub require_signatures: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            initial_supply: default_initial_supply(),
            founder_address: default_founder_address(),
            require_signatures: true,
        }
    }
}

impl LedgerConfig {
    pub fn founder(&self) -> Address {
        Address(self.founder_address.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "ledger.difficulty must be between 1 and {}, got {}",
                MAX_DIFFICULTY, self.difficulty
            )));
        }

        if !self.mining_reward.is_finite() || self.mining_reward < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "ledger.mining_reward must be a non-negative number, got {}",
                self.mining_reward
            )));
        }

        if !self.initial_supply.is_finite() || self.initial_supply < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "ledger.initial_supply must be a non-negative number, got {}",
                self.initial_supply
            )));
        }

        if !is_valid_address(&self.founder_address) {
            return Err(ConfigError::Invalid(format!(
                "ledger.founder_address is not a valid address: {}",
                self.founder_address
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Loads the config file named by `SPW_CONFIG`, falling back to `config.toml`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Self::load_from(&path)
    }

    /// Loads a config file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ledger.validate()?;

        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }

        if self.storage.enabled && self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.data_dir must be set when storage is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_difficulty() -> usize {
    2
}

fn default_mining_reward() -> f64 {
    100.0
}

fn default_initial_supply() -> f64 {
    1000.0
}

fn default_founder_address() -> String {
    derive_key(FOUNDER_SEED_PHRASE)
        .map(|key| derive_address(&key).0)
        .unwrap_or_default()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/blockchain")
}
