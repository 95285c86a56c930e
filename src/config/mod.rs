//! Configuration management
//!
//! This module handles loading, validation, and management of the Tannoy
//! configuration. Configuration is stored in TOML format at
//! ~/.tannoy/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **telegram**: Bot token, allowed users, long-poll timeout
//!
//! # Path Expansion
//!
//! The configuration system automatically expands ~ to the user's home
//! directory and creates the data directory on first use. The bot token may
//! be supplied via the `TANNOY_TELEGRAM_TOKEN` environment variable instead
//! of the config file, which keeps it out of plain-text config on shared
//! machines.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::TannoyError;

/// Environment variable that overrides the configured bot token.
pub const TOKEN_ENV_VAR: &str = "TANNOY_TELEGRAM_TOKEN";

/// Default configuration written on first run.
const DEFAULT_CONFIG: &str = r#"# Tannoy configuration

[core]
# Where the announcement snapshot lives
data_dir = "~/.tannoy"
# Log level (error, warn, info, debug, trace)
log_level = "info"

[telegram]
# Bot token from @BotFather. May also be set via TANNOY_TELEGRAM_TOKEN.
token = ""
# Telegram user ids allowed to configure announcements. Empty = allow all.
allowed_users = []
# Long-poll timeout for getUpdates, in seconds
poll_timeout_secs = 30
"#;

/// Main configuration structure
///
/// Represents the complete Tannoy configuration loaded from
/// ~/.tannoy/config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Telegram transport settings
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Telegram transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token (empty when supplied via environment)
    #[serde(default)]
    pub token: String,

    /// User ids allowed to drive the configuration dialog. Empty = allow all.
    #[serde(default)]
    pub allowed_users: Vec<i64>,

    /// Long-poll timeout for getUpdates, in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.tannoy")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            allowed_users: Vec::new(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Config {
    /// Returns the default config file path (~/.tannoy/config.toml)
    pub fn default_path() -> Result<PathBuf, TannoyError> {
        let home = dirs::home_dir()
            .ok_or_else(|| TannoyError::Config("Could not determine home directory".into()))?;
        Ok(home.join(".tannoy").join("config.toml"))
    }

    /// Load configuration from the default location, creating a commented
    /// default file on first run.
    pub fn load_or_create() -> Result<Self, TannoyError> {
        let path = Self::default_path()?;

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    TannoyError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
            fs::write(&path, DEFAULT_CONFIG).map_err(|e| {
                TannoyError::Config(format!("Failed to write default config: {}", e))
            })?;
            tracing::info!("Created default configuration at {}", path.display());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, TannoyError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| TannoyError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| TannoyError::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Resolve the data directory with ~ expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.core.data_dir)
    }

    /// Resolve the bot token: environment variable wins over the config file.
    pub fn bot_token(&self) -> Result<String, TannoyError> {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        if self.telegram.token.is_empty() {
            return Err(TannoyError::Config(format!(
                "No bot token configured. Set [telegram].token or {}",
                TOKEN_ENV_VAR
            )));
        }
        Ok(self.telegram.token.clone())
    }
}

/// Expand a leading ~ to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(rest) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
    }
    path.to_path_buf()
}
