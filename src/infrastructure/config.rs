//! Environment-driven configuration.
//!
//! Every `from_env` constructor delegates to a `from_lookup` twin taking a
//! variable lookup function, so tests can feed values without touching the
//! process environment.
//!
//! # Environment Variables
//!
//! Server:
//! - `HOST`: bind address (default `0.0.0.0`)
//! - `PORT`: bind port (default `3000`)
//! - `SEED_DEMO_DATA`: `true` | `false` (default `false`)
//!
//! Client:
//! - `API_BASE_URL`: base URL of the persistence API (default `http://127.0.0.1:3000`)
//! - `API_USER_ID`: signed-in user; unset means offline
//! - `API_TIMEOUT_MS`: request timeout; unset means no timeout
//! - `SYNC_FENCING`: `last_response_wins` (default) | `issue_order`

use thiserror::Error;

use crate::domain::UserId;
use crate::sync::FencingMode;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Invalid RNG seed value.
    #[error("Invalid RNG_SEED: {message} (got '{value}')")]
    InvalidRngSeed {
        /// Error message.
        message: String,
        /// Actual value.
        value: String,
    },

    /// A variable that should hold a number does not.
    #[error("Invalid number for {name}: {message} (got '{value}')")]
    InvalidNumber {
        /// Variable name.
        name: String,
        /// Error message.
        message: String,
        /// Actual value.
        value: String,
    },

    /// A variable that should hold a boolean does not.
    #[error("Invalid boolean for {name}: expected true or false (got '{value}')")]
    InvalidBool {
        /// Variable name.
        name: String,
        /// Actual value.
        value: String,
    },

    /// Unknown fencing mode.
    #[error("Invalid SYNC_FENCING: '{0}' (expected last_response_wins or issue_order)")]
    InvalidFencingMode(String),

    /// Base URL without an http(s) scheme.
    #[error("Invalid API_BASE_URL: '{0}' (expected http:// or https://)")]
    InvalidBaseUrl(String),

    /// Failure rate out of range.
    #[error("Invalid failure rate: must be 0.0-1.0, got {0}")]
    InvalidFailureRate(f64),

    /// Timeout rate out of range.
    #[error("Invalid timeout rate: must be 0.0-1.0, got {0}")]
    InvalidTimeoutRate(f64),

    /// Invalid delay range.
    #[error("Invalid delay range: min ({min}) > max ({max})")]
    InvalidDelayRange {
        /// Minimum delay.
        min: u64,
        /// Maximum delay.
        max: u64,
    },
}

// =============================================================================
// Variable Parsing
// =============================================================================

/// Reads a variable, treating empty and whitespace-only values as unset.
pub(crate) fn lookup_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses a number, returning `default` when unset.
pub(crate) fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup_trimmed(lookup, name).map_or(Ok(default), |value| {
        value.parse().map_err(|error: T::Err| ConfigError::InvalidNumber {
            name: name.to_string(),
            message: error.to_string(),
            value,
        })
    })
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup_trimmed(lookup, name) {
        None => Ok(default),
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                name: name.to_string(),
                value,
            }),
        },
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration of the reference server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Start with the demo workspace loaded.
    pub seed_demo_data: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            seed_demo_data: false,
        }
    }
}

impl ServerConfig {
    /// Reads `HOST`, `PORT` and `SEED_DEMO_DATA`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PORT` or `SEED_DEMO_DATA` is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServerConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PORT` or `SEED_DEMO_DATA` is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup_trimmed(&lookup, "HOST").unwrap_or(defaults.host),
            port: parse_number(&lookup, "PORT", defaults.port)?,
            seed_demo_data: parse_bool(&lookup, "SEED_DEMO_DATA", defaults.seed_demo_data)?,
        })
    }

    /// The `host:port` pair to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration of a sync client talking to a remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// `None` runs the client offline.
    pub user_id: Option<UserId>,
    pub timeout_ms: Option<u64>,
    pub fencing: FencingMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            user_id: None,
            timeout_ms: None,
            fencing: FencingMode::default(),
        }
    }
}

impl ClientConfig {
    /// Reads `API_BASE_URL`, `API_USER_ID`, `API_TIMEOUT_MS` and `SYNC_FENCING`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is malformed or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is malformed or fails validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout_ms = lookup_trimmed(&lookup, "API_TIMEOUT_MS")
            .map(|_| parse_number(&lookup, "API_TIMEOUT_MS", 0_u64))
            .transpose()?;
        let fencing = lookup_trimmed(&lookup, "SYNC_FENCING")
            .map(|value| value.parse::<FencingMode>())
            .transpose()?
            .unwrap_or(defaults.fencing);

        let config = Self {
            base_url: lookup_trimmed(&lookup, "API_BASE_URL").unwrap_or(defaults.base_url),
            user_id: lookup_trimmed(&lookup, "API_USER_ID").map(UserId::new),
            timeout_ms,
            fencing,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` when the base URL is not http(s).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
