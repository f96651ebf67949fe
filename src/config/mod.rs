use alloy::primitives::Address;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no vault address configured (use --vault or VAULTCTL_VAULT)")]
    MissingVault,
    #[error("invalid address {value:?} for {field}")]
    InvalidAddress { field: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub tx: TxConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Acting identity (address or private key). Env/CLI only.
    #[serde(skip)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint (http/ws)
    #[serde(default = "default_rpc_url")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    /// Vault contract address
    #[serde(default)]
    pub address: Option<String>,
    /// Hardhat artifact whose `abi` array declares the vault's events.
    #[serde(default)]
    pub abi_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxConfig {
    /// Fixed gas limit for every submission; never estimated.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Upper bound on waiting for a receipt after broadcast.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Applied to the poll interval for the cycle after a failed fetch.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
    /// Consecutive fetch failures before a task reinstalls its filter.
    #[serde(default = "default_reinstall_after")]
    pub reinstall_after_failures: u32,
    /// Event names to watch (empty = every event in the schema).
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}
fn default_gas_limit() -> u64 {
    5_000_000
}
fn default_receipt_timeout_secs() -> u64 {
    120
}
fn default_receipt_poll_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    2_000
}
fn default_backoff_multiplier() -> u32 {
    5
}
fn default_reinstall_after() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
        }
    }
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            receipt_poll_ms: default_receipt_poll_ms(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            reinstall_after_failures: default_reinstall_after(),
            events: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl TxConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Sleep after a failed fetch: base interval times the multiplier.
    pub fn backoff_interval(&self) -> Duration {
        self.poll_interval() * self.backoff_multiplier.max(1)
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    // Identities never go in the config file.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VAULTCTL_RPC_URL") {
            self.rpc.url = url;
        }
        if let Ok(vault) = std::env::var("VAULTCTL_VAULT") {
            self.vault.address = Some(vault);
        }
        if let Ok(account) = std::env::var("VAULTCTL_ACCOUNT") {
            self.account = Some(account);
        }
    }

    /// The configured vault address, validated.
    pub fn vault_address(&self) -> Result<Address, ConfigError> {
        let raw = self
            .vault
            .address
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingVault)?;
        parse_address("vault", raw)
    }
}

/// Parse an address, accepting it with or without the `0x` prefix.
pub fn parse_address(field: &'static str, raw: &str) -> Result<Address, ConfigError> {
    let trimmed = raw.trim();
    let prefixed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        trimmed.to_string()
    } else {
        format!("0x{trimmed}")
    };
    Address::from_str(&prefixed).map_err(|_| ConfigError::InvalidAddress {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.rpc.url, "http://127.0.0.1:8545");
        assert_eq!(config.tx.gas_limit, 5_000_000);
        assert_eq!(config.monitor.backoff_multiplier, 5);
        assert_eq!(config.monitor.backoff_interval(), Duration::from_secs(10));
        assert!(config.vault.address.is_none());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [vault]
            address = "0x934A389CaBFB84cdB3f0260B2a4FD575b8B345A3"

            [monitor]
            poll_interval_ms = 500
            events = ["Deposit"]
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.monitor.events, vec!["Deposit".to_string()]);
        assert!(config.vault_address().is_ok());
    }

    #[test]
    fn test_vault_address_errors() {
        let mut config = Config::default();
        assert!(matches!(config.vault_address(), Err(ConfigError::MissingVault)));

        config.vault.address = Some("not-an-address".to_string());
        assert!(matches!(
            config.vault_address(),
            Err(ConfigError::InvalidAddress { field: "vault", .. })
        ));
    }

    #[test]
    fn test_parse_address_without_prefix() {
        let with = parse_address("token", "0x934A389CaBFB84cdB3f0260B2a4FD575b8B345A3").unwrap();
        let without = parse_address("token", "934a389cabfb84cdb3f0260b2a4fd575b8b345a3").unwrap();
        assert_eq!(with, without);
    }
}
