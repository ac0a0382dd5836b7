// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-config
//!
//! Process-wide configuration for the PYROWATCH service.
//!
//! Configuration is loaded once at start from the environment. Every key has
//! a default except `DATABASE_URL`:
//!
//! | Key | Default | Effect |
//! |---|---|---|
//! | `DATABASE_URL` | — | dsn for the reading store and device registry |
//! | `POLL_INTERVAL` | 5 s | cycle period per bus |
//! | `MODBUS_TIMEOUT` | 5 s | per-transaction deadline |
//! | `BUFFER_THRESHOLD` | 100 | write-back buffer swap point |
//! | `BUFFER_MAX_HOLD` | 5 s | forced buffer swap |
//! | `RETENTION_DAYS` | 2 | reading bulk-delete horizon |
//! | `CONFIG_PIN` | `1234` | PIN checked by `/api/config/verify-pin` |
//! | `BIND_ADDR` | `0.0.0.0:8000` | HTTP listener |

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("missing required environment variable '{key}'")]
    Missing {
        /// The absent key.
        key: String,
    },

    /// A key is present but unparseable.
    #[error("invalid value for '{key}': {message}")]
    Invalid {
        /// The offending key.
        key: String,
        /// Why it was rejected.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// ServiceConfig
// =============================================================================

/// Immutable process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Database dsn for the reading store and device registry.
    pub database_url: String,

    /// Cycle period per bus.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Per-transaction Modbus deadline.
    #[serde(with = "duration_secs")]
    pub modbus_timeout: Duration,

    /// Write-back buffer swap point.
    pub buffer_threshold: usize,

    /// Forced buffer swap interval.
    #[serde(with = "duration_secs")]
    pub buffer_max_hold: Duration,

    /// Reading retention horizon in days.
    pub retention_days: u32,

    /// PIN for the configuration endpoints.
    pub config_pin: String,

    /// HTTP listener address.
    pub bind_addr: SocketAddr,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl ServiceConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            database_url: require("DATABASE_URL")?,
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL", 5)?),
            modbus_timeout: Duration::from_secs(parse_or("MODBUS_TIMEOUT", 5)?),
            buffer_threshold: parse_or("BUFFER_THRESHOLD", 100)?,
            buffer_max_hold: Duration::from_secs(parse_or("BUFFER_MAX_HOLD", 5)?),
            retention_days: parse_or("RETENTION_DAYS", 2)?,
            config_pin: env::var("CONFIG_PIN").unwrap_or_else(|_| "1234".to_string()),
            bind_addr: parse_or_with("BIND_ADDR", "0.0.0.0:8000")?,
        };

        config.validate()?;

        info!(
            poll_interval_s = config.poll_interval.as_secs(),
            buffer_threshold = config.buffer_threshold,
            bind_addr = %config.bind_addr,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Validates cross-field invariants.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "DATABASE_URL".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("POLL_INTERVAL", "must be at least 1"));
        }
        if self.modbus_timeout.is_zero() {
            return Err(ConfigError::invalid("MODBUS_TIMEOUT", "must be at least 1"));
        }
        if self.buffer_threshold == 0 {
            return Err(ConfigError::invalid("BUFFER_THRESHOLD", "must be at least 1"));
        }
        Ok(())
    }

    /// Window after which a silent device's timeouts turn `Stale`.
    pub fn stale_window(&self) -> Duration {
        self.poll_interval * 3
    }

    /// A configuration suitable for tests: in-memory store, short timers.
    pub fn for_testing() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            poll_interval: Duration::from_millis(50),
            modbus_timeout: Duration::from_millis(100),
            buffer_threshold: 10,
            buffer_max_hold: Duration::from_millis(100),
            retention_days: 2,
            config_pin: "1234".to_string(),
            bind_addr: "127.0.0.1:0".parse().expect("loopback address"),
        }
    }
}

// =============================================================================
// Env helpers
// =============================================================================

fn require(key: &str) -> ConfigResult<String> {
    env::var(key).map_err(|_| ConfigError::Missing {
        key: key.to_string(),
    })
}

fn parse_or<T>(key: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_or_with<T>(key: &str, default: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
