//! Umbra Configuration
//!
//! Shared configuration crate for the Umbra commitment daemon.
//!
//! Handles loading configuration from:
//! 1. UMBRA_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.umbra/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".umbra";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "./umbra-db";
const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:3100";
const DEFAULT_DIRECTORY_URL: &str = "http://127.0.0.1:3200";
const DEFAULT_ACCOUNTS_URL: &str = "http://127.0.0.1:3300";
const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3400";
const DEFAULT_USER: &str = "alice";

/// Ledger calls include proof generation.
const DEFAULT_LEDGER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

const DEFAULT_FT_TOKEN_CONTRACT: &str = "0x1111111111111111111111111111111111111111";
const DEFAULT_FT_SHIELD_CONTRACT: &str = "0x2222222222222222222222222222222222222222";
const DEFAULT_NFT_TOKEN_CONTRACT: &str = "0x3333333333333333333333333333333333333333";
const DEFAULT_NFT_SHIELD_CONTRACT: &str = "0x4444444444444444444444444444444444444444";

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UmbraConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub directory: ServiceConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub asset: AssetConfig,
    #[serde(default)]
    pub user: UserConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.into(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.into()
}

/// How a collaborator is reached: in-process mock or a remote HTTP service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    #[default]
    Mock,
    Http,
}

/// Ledger (proving + accumulator) service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: ServiceMode,
    #[serde(default = "default_ledger_url")]
    pub url: String,
    #[serde(default = "default_ledger_timeout")]
    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: ServiceMode::Mock,
            url: DEFAULT_LEDGER_URL.into(),
            timeout_secs: DEFAULT_LEDGER_TIMEOUT_SECS,
        }
    }
}

fn default_ledger_url() -> String {
    DEFAULT_LEDGER_URL.into()
}
fn default_ledger_timeout() -> u64 {
    DEFAULT_LEDGER_TIMEOUT_SECS
}

/// Key directory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub mode: ServiceMode,
    #[serde(default = "default_directory_url")]
    pub url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mode: ServiceMode::Mock,
            url: DEFAULT_DIRECTORY_URL.into(),
        }
    }
}

fn default_directory_url() -> String {
    DEFAULT_DIRECTORY_URL.into()
}

/// One-time account provisioning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default)]
    pub mode: ServiceMode,
    #[serde(default = "default_accounts_url")]
    pub url: String,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            mode: ServiceMode::Mock,
            url: DEFAULT_ACCOUNTS_URL.into(),
        }
    }
}

fn default_accounts_url() -> String {
    DEFAULT_ACCOUNTS_URL.into()
}

/// Notification transport
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    #[default]
    Local,
    Relay,
}

/// Notification channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub mode: ChannelMode,
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mode: ChannelMode::Local,
            relay_url: DEFAULT_RELAY_URL.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.into()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Per-call bounds for directory, accounts and channel calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

fn default_call_timeout() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

/// Token and shield contract addresses per asset class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_ft_token")]
    pub ft_token_contract: String,
    #[serde(default = "default_ft_shield")]
    pub ft_shield_contract: String,
    #[serde(default = "default_nft_token")]
    pub nft_token_contract: String,
    #[serde(default = "default_nft_shield")]
    pub nft_shield_contract: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            ft_token_contract: DEFAULT_FT_TOKEN_CONTRACT.into(),
            ft_shield_contract: DEFAULT_FT_SHIELD_CONTRACT.into(),
            nft_token_contract: DEFAULT_NFT_TOKEN_CONTRACT.into(),
            nft_shield_contract: DEFAULT_NFT_SHIELD_CONTRACT.into(),
        }
    }
}

fn default_ft_token() -> String {
    DEFAULT_FT_TOKEN_CONTRACT.into()
}
fn default_ft_shield() -> String {
    DEFAULT_FT_SHIELD_CONTRACT.into()
}
fn default_nft_token() -> String {
    DEFAULT_NFT_TOKEN_CONTRACT.into()
}
fn default_nft_shield() -> String {
    DEFAULT_NFT_SHIELD_CONTRACT.into()
}

/// Identity the daemon listens for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_user")]
    pub name: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_USER.into(),
        }
    }
}

fn default_user() -> String {
    DEFAULT_USER.into()
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

fn parse_service_mode(v: &str) -> ServiceMode {
    match v.to_ascii_lowercase().as_str() {
        "http" => ServiceMode::Http,
        _ => ServiceMode::Mock,
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl UmbraConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("UMBRA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        env_string("UMBRA_DB_PATH", &mut self.database.path);

        if let Ok(v) = env::var("UMBRA_LEDGER_MODE") {
            self.ledger.mode = parse_service_mode(&v);
        }
        env_string("UMBRA_LEDGER_URL", &mut self.ledger.url);
        env_parse("UMBRA_LEDGER_TIMEOUT_SECS", &mut self.ledger.timeout_secs);

        if let Ok(v) = env::var("UMBRA_DIRECTORY_MODE") {
            self.directory.mode = parse_service_mode(&v);
        }
        env_string("UMBRA_DIRECTORY_URL", &mut self.directory.url);

        if let Ok(v) = env::var("UMBRA_ACCOUNTS_MODE") {
            self.accounts.mode = parse_service_mode(&v);
        }
        env_string("UMBRA_ACCOUNTS_URL", &mut self.accounts.url);

        if let Ok(v) = env::var("UMBRA_CHANNEL_MODE") {
            self.channel.mode = match v.to_ascii_lowercase().as_str() {
                "relay" => ChannelMode::Relay,
                _ => ChannelMode::Local,
            };
        }
        env_string("UMBRA_RELAY_URL", &mut self.channel.relay_url);

        env_parse("UMBRA_CALL_TIMEOUT_MS", &mut self.timeouts.call_timeout_ms);
        env_string("UMBRA_USER", &mut self.user.name);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.ledger.mode = ServiceMode::Http;
        sample.channel.mode = ChannelMode::Relay;
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.call_timeout_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
