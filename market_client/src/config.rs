//! Client configuration from environment or TOML, with validation

use std::env;
use std::path::Path;
use std::time::Duration;

use ethereum_types::Address;
use serde::{Deserialize, Serialize};

use crate::gateway::{ConfirmationPolicy, SigningSession};

pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;
pub const BASE_SEPOLIA_RPC_URL: &str = "https://sepolia.base.org";
const DEFAULT_FACTORY: &str = "0xDb657bC5A74A81E919f9d671035dB0b6370c9d16";
const DEFAULT_ORACLE: &str = "0xfc70C42bC2355Cbc98Bc575032dA8Dc33F0a11F4";
const DEFAULT_USDC: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub chain: ChainConfig,
    pub contracts: ContractsConfig,
    pub polling: PollingConfig,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub factory: Address,
    pub oracle: Address,
    pub usdc: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(with = "humantime_serde")]
    pub balance_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub statistics_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub confirmation_poll_interval: Duration,
    #[serde(default, with = "humantime_serde")]
    pub confirmation_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub page_size: u64,
}

/// Who signs writes. A private key wins over a node-managed address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignerConfig {
    pub private_key: Option<String>,
    pub address: Option<Address>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                rpc_url: BASE_SEPOLIA_RPC_URL.to_string(),
                chain_id: BASE_SEPOLIA_CHAIN_ID,
            },
            contracts: ContractsConfig {
                factory: parse_default_address(DEFAULT_FACTORY),
                oracle: parse_default_address(DEFAULT_ORACLE),
                usdc: parse_default_address(DEFAULT_USDC),
            },
            polling: PollingConfig {
                balance_interval: Duration::from_secs(10),
                statistics_interval: Duration::from_secs(30),
                confirmation_poll_interval: Duration::from_secs(2),
                confirmation_timeout: None,
            },
            directory: DirectoryConfig { page_size: 50 },
            signer: SignerConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_default_address(value: &str) -> Address {
    value.parse().unwrap_or_default()
}

impl ClientConfig {
    /// Load from `.env` and the process environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(ClientConfig {
            chain: ChainConfig {
                rpc_url: var("RPC_URL").unwrap_or(defaults.chain.rpc_url),
                chain_id: parse_or("CHAIN_ID", var("CHAIN_ID"), defaults.chain.chain_id)?,
            },
            contracts: ContractsConfig {
                factory: parse_address("FACTORY_ADDRESS", var("FACTORY_ADDRESS"), defaults.contracts.factory)?,
                oracle: parse_address("ORACLE_ADDRESS", var("ORACLE_ADDRESS"), defaults.contracts.oracle)?,
                usdc: parse_address("USDC_ADDRESS", var("USDC_ADDRESS"), defaults.contracts.usdc)?,
            },
            polling: PollingConfig {
                balance_interval: parse_duration(
                    "BALANCE_POLL_INTERVAL",
                    var("BALANCE_POLL_INTERVAL"),
                    defaults.polling.balance_interval,
                )?,
                statistics_interval: parse_duration(
                    "STATISTICS_POLL_INTERVAL",
                    var("STATISTICS_POLL_INTERVAL"),
                    defaults.polling.statistics_interval,
                )?,
                confirmation_poll_interval: parse_duration(
                    "CONFIRMATION_POLL_INTERVAL",
                    var("CONFIRMATION_POLL_INTERVAL"),
                    defaults.polling.confirmation_poll_interval,
                )?,
                confirmation_timeout: match var("CONFIRMATION_TIMEOUT") {
                    Some(value) => Some(duration_value("CONFIRMATION_TIMEOUT", &value)?),
                    None => None,
                },
            },
            directory: DirectoryConfig {
                page_size: parse_or("DIRECTORY_PAGE_SIZE", var("DIRECTORY_PAGE_SIZE"), defaults.directory.page_size)?,
            },
            signer: SignerConfig {
                private_key: var("SIGNER_PRIVATE_KEY"),
                address: match var("SIGNER_ADDRESS") {
                    Some(value) => Some(address_value("SIGNER_ADDRESS", &value)?),
                    None => None,
                },
            },
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("rpc_url".to_string()));
        }
        if self.chain.chain_id == 0 {
            return Err(ConfigError::InvalidConfig("chain_id must be non-zero".to_string()));
        }
        for (name, address) in [
            ("factory", self.contracts.factory),
            ("oracle", self.contracts.oracle),
            ("usdc", self.contracts.usdc),
        ] {
            if address.is_zero() {
                return Err(ConfigError::MissingRequired(format!("{} address", name)));
            }
        }
        if self.directory.page_size == 0 {
            return Err(ConfigError::InvalidConfig("page_size must be greater than 0".to_string()));
        }
        let intervals = [
            self.polling.balance_interval,
            self.polling.statistics_interval,
            self.polling.confirmation_poll_interval,
        ];
        if intervals.iter().any(Duration::is_zero) {
            return Err(ConfigError::InvalidConfig("poll intervals must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: self.polling.confirmation_poll_interval,
            timeout: self.polling.confirmation_timeout,
        }
    }

    /// `None` leaves the client read-only
    pub fn signing_session(&self) -> Result<Option<SigningSession>, ConfigError> {
        if let Some(key) = &self.signer.private_key {
            return SigningSession::from_private_key_hex(key)
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue("SIGNER_PRIVATE_KEY".to_string(), e.to_string()));
        }
        Ok(self.signer.address.map(SigningSession::node_managed))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn address_value(key: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{:?}", e)))
}

fn parse_address(key: &str, value: Option<String>, default: Address) -> Result<Address, ConfigError> {
    value.map_or(Ok(default), |v| address_value(key, &v))
}

/// Plain numbers are seconds; anything else goes through humantime ("500ms", "1m")
fn duration_value(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_duration(key: &str, value: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    value.map_or(Ok(default), |v| duration_value(key, &v))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
