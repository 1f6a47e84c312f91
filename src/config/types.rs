//! Raw configuration types for TOML parsing

use super::*;
use serde::Deserialize;

/// Raw configuration as parsed from TOML
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub store: Option<RawStoreConfig>,
    pub logging: Option<RawLoggingConfig>,
    pub walkthrough: Option<RawWalkthroughConfig>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawStoreConfig {
    pub endpoints: Option<Vec<String>>,
    pub dial_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl TryFrom<RawStoreConfig> for StoreConfig {
    type Error = ConfigError;

    fn try_from(raw: RawStoreConfig) -> Result<Self, Self::Error> {
        let defaults = StoreConfig::default();

        let endpoints = raw.endpoints.unwrap_or(defaults.endpoints);
        if endpoints.is_empty() || endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "store.endpoints must list at least one address".to_string(),
            ));
        }

        let dial_timeout = match raw.dial_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "store.dial_timeout_secs must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.dial_timeout,
        };

        let request_timeout = match raw.request_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "store.request_timeout_secs must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        Ok(Self {
            endpoints,
            dial_timeout,
            request_timeout,
            username: raw.username.unwrap_or(defaults.username),
            password: raw.password.map(SecretString::from),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl From<RawLoggingConfig> for LoggingConfig {
    fn from(raw: RawLoggingConfig) -> Self {
        Self {
            level: raw.level.unwrap_or_else(|| "info".to_string()),
            format: match raw.format.as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RawWalkthroughConfig {
    pub sample_key: Option<String>,
    pub sample_value: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub scoped_key: Option<String>,
    pub foreign_key: Option<String>,
}

impl From<RawWalkthroughConfig> for WalkthroughSettings {
    fn from(raw: RawWalkthroughConfig) -> Self {
        let defaults = WalkthroughSettings::default();
        let user = raw.user.unwrap_or(defaults.user);
        // Keep the scoped key under the configured user's prefix
        let scoped_key = raw
            .scoped_key
            .unwrap_or_else(|| format!("{}/123", user));

        Self {
            sample_key: raw.sample_key.unwrap_or(defaults.sample_key),
            sample_value: raw.sample_value.unwrap_or(defaults.sample_value),
            password: raw
                .password
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            role: raw.role.unwrap_or(defaults.role),
            scoped_key,
            scoped_value: defaults.scoped_value,
            foreign_key: raw.foreign_key.unwrap_or(defaults.foreign_key),
            user,
        }
    }
}
