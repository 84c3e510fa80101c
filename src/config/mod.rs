//! Application configuration
//!
//! Values come from defaults, then an optional JSON file, then environment
//! variables, and are validated once at the end.

use crate::monitor::MonitorConfig;
use crate::provider::EsploraClient;
use crate::script::Network;
use crate::signing::coordinator::DEFAULT_SIGNING_TIMEOUT;
use crate::tx::fee::{DEFAULT_DUST_LIMIT, DEFAULT_MAX_FEE_RATE};
use crate::tx::{FeePolicy, FeeRate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Device signing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Time allowed for a person to confirm on a device
    pub timeout_secs: u64,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SIGNING_TIMEOUT.as_secs(),
        }
    }
}

/// Lifecycle monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub confirmation_threshold: u32,
    pub propagation_timeout_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            confirmation_threshold: defaults.confirmation_threshold,
            propagation_timeout_secs: defaults.propagation_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: Network,
    /// Esplora base URL; the public endpoint for `network` when unset
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Fee rate used when none is given (sat/vB)
    pub default_fee_rate: f64,
    /// Sanity ceiling (sat/vB)
    pub max_fee_rate: u64,
    pub dust_limit: u64,
    pub log_level: String,
    pub wallet_dir: PathBuf,
    pub signing: SigningSettings,
    pub monitor: MonitorSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            api_url: None,
            api_key: None,
            default_fee_rate: 10.0,
            max_fee_rate: DEFAULT_MAX_FEE_RATE,
            dust_limit: DEFAULT_DUST_LIMIT,
            log_level: "info".to_string(),
            wallet_dir: PathBuf::from(".barq"),
            signing: SigningSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Config {
    /// Load from `path` (if given) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply `BITCOIN_*`, fee, log and directory overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        fn invalid(key: &str, value: &str) -> ConfigError {
            ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }
        }

        if let Some(v) = lookup("BITCOIN_NETWORK") {
            self.network = v.parse().map_err(|_| invalid("BITCOIN_NETWORK", &v))?;
        }
        if let Some(v) = lookup("BITCOIN_API_URL") {
            self.api_url = Some(v);
        }
        if let Some(v) = lookup("BITCOIN_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("DEFAULT_FEE_RATE") {
            self.default_fee_rate = v.trim().parse().map_err(|_| invalid("DEFAULT_FEE_RATE", &v))?;
        }
        if let Some(v) = lookup("MAX_FEE_RATE") {
            self.max_fee_rate = v.trim().parse().map_err(|_| invalid("MAX_FEE_RATE", &v))?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v.trim().to_lowercase();
        }
        if let Some(v) = lookup("WALLET_DIR") {
            self.wallet_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_fee_rate.is_finite() || self.default_fee_rate <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default fee rate {} must be positive",
                self.default_fee_rate
            )));
        }
        if self.default_fee_rate > self.max_fee_rate as f64 {
            return Err(ConfigError::Invalid(format!(
                "default fee rate {} exceeds ceiling {}",
                self.default_fee_rate, self.max_fee_rate
            )));
        }
        if self.monitor.confirmation_threshold == 0 {
            return Err(ConfigError::Invalid("confirmation threshold must be at least 1".into()));
        }
        if self.monitor.poll_interval_secs == 0 || self.signing.timeout_secs == 0 {
            return Err(ConfigError::Invalid("intervals and timeouts must be positive".into()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "LOG_LEVEL".into(),
                value: self.log_level.clone(),
            });
        }
        Ok(())
    }

    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy {
            max_fee_rate: FeeRate::from_sat_per_vb(self.max_fee_rate),
            dust_limit: self.dust_limit,
        }
    }

    pub fn default_fee_rate(&self) -> FeeRate {
        FeeRate::from_sat_per_vb_f64(self.default_fee_rate)
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.signing.timeout_secs)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.monitor.poll_interval_secs),
            confirmation_threshold: self.monitor.confirmation_threshold,
            propagation_timeout: Duration::from_secs(self.monitor.propagation_timeout_secs),
        }
    }

    /// Block explorer client for the configured network
    pub fn esplora(&self) -> EsploraClient {
        let client = match &self.api_url {
            Some(url) => EsploraClient::new(url, self.network),
            None => EsploraClient::for_network(self.network),
        };
        client.with_api_key(self.api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BITCOIN_NETWORK", "regtest"),
            ("DEFAULT_FEE_RATE", "2.5"),
            ("WALLET_DIR", "/tmp/wallets"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.default_fee_rate().as_sat_per_kvb(), 2_500);
        assert_eq!(config.wallet_dir, PathBuf::from("/tmp/wallets"));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        let result = config.apply_overrides(|k| (k == "MAX_FEE_RATE").then(|| "lots".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let config = Config {
            default_fee_rate: 5_000.0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_file_then_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barq.json");
        fs::write(&path, r#"{ "network": "mainnet", "monitor": { "confirmation_threshold": 3 } }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.monitor_config().confirmation_threshold, 3);
        assert_eq!(config.monitor.poll_interval_secs, 30);
        assert_eq!(config.max_fee_rate, DEFAULT_MAX_FEE_RATE);
    }
}
