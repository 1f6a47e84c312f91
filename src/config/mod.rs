//! Configuration system for kvwarden
//!
//! Loads configuration from TOML files.

mod types;

pub use types::*;

use crate::auth::DEFAULT_REQUEST_TIMEOUT;
use crate::store::Credentials;
use crate::walkthrough::WalkthroughSettings;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Dial budget used unless configured otherwise
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Template written by `kvwarden init`
pub const DEFAULT_CONFIG: &str = r#"# kvwarden configuration

[store]
endpoints = ["127.0.0.1:2379"]
dial_timeout_secs = 5
request_timeout_secs = 3
username = "root"
# password = "1234"   # or set KVWARDEN_PASSWORD, otherwise you are prompted

[logging]
level = "info"
format = "pretty"

[walkthrough]
user = "user1"
password = "123"
role = "role1"
# sample_key = "sample_key"
# sample_value = "sample_value"
# scoped_key = "user1/123"
# foreign_key = "user3/123"
"#;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main kvwarden configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Store connection
    pub store: StoreConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Walkthrough names and values
    pub walkthrough: WalkthroughSettings,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Self::from_raw(raw)
    }

    /// Convert from raw TOML config to validated config
    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let store = raw.store.unwrap_or_default().try_into()?;
        let logging = raw.logging.unwrap_or_default().into();
        let walkthrough = raw.walkthrough.unwrap_or_default().into();

        Ok(Self {
            store,
            logging,
            walkthrough,
        })
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            walkthrough: WalkthroughSettings::default(),
        }
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kvwarden")
            .join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Store connection configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Cluster endpoints (host:port)
    pub endpoints: Vec<String>,
    /// Budget for establishing a connection
    pub dial_timeout: Duration,
    /// Budget for each individual request
    pub request_timeout: Duration,
    /// Administrative user
    pub username: String,
    /// Administrative password, if stored in the config
    pub password: Option<SecretString>,
}

impl StoreConfig {
    /// Admin login, using `password` when the config holds none
    pub fn admin_credentials(&self, password: SecretString) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone().unwrap_or(password),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:2379".to_string()],
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            username: "root".to_string(),
            password: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Format: "json" or "pretty"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format
    Pretty,
    /// JSON format
    Json,
}
