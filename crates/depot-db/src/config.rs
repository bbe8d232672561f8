//! # Ledger Configuration
//!
//! Runtime settings for binaries and embedders, read from the environment.
//!
//! | Variable                         | Default     |
//! |----------------------------------|-------------|
//! | `DEPOT_DB_PATH`                  | `depot.db`  |
//! | `DEPOT_MAX_CONNECTIONS`          | `5`         |
//! | `DEPOT_CONFLICT_RETRIES`         | `5`         |
//! | `DEPOT_RETRY_INITIAL_BACKOFF_MS` | `10`        |
//! | `DEPOT_RETRY_MAX_BACKOFF_MS`     | `200`       |

use std::path::PathBuf;
use std::time::Duration;

use backoff::ExponentialBackoff;
use thiserror::Error;
use tracing::debug;

use crate::pool::DbConfig;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded retry for write conflicts.
///
/// Only [`depot_core::StockError::Conflict`] is retried. Anything else is
/// returned on the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Exponential backoff schedule between attempts.
    pub(crate) fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Ledger Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("depot.db"),
            max_connections: 5,
            retry: RetryPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(path) = lookup("DEPOT_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            config.database_path = PathBuf::from(path);
        }

        if let Some(value) = lookup("DEPOT_MAX_CONNECTIONS") {
            config.max_connections = parse_at_least("DEPOT_MAX_CONNECTIONS", &value, 1)?;
        }

        if let Some(value) = lookup("DEPOT_CONFLICT_RETRIES") {
            config.retry.max_attempts = parse_at_least("DEPOT_CONFLICT_RETRIES", &value, 1)?;
        }

        if let Some(value) = lookup("DEPOT_RETRY_INITIAL_BACKOFF_MS") {
            let ms: u64 = parse_at_least("DEPOT_RETRY_INITIAL_BACKOFF_MS", &value, 0)?;
            config.retry.initial_backoff = Duration::from_millis(ms);
        }

        if let Some(value) = lookup("DEPOT_RETRY_MAX_BACKOFF_MS") {
            let ms: u64 = parse_at_least("DEPOT_RETRY_MAX_BACKOFF_MS", &value, 0)?;
            config.retry.max_backoff = Duration::from_millis(ms);
        }

        if config.retry.max_backoff < config.retry.initial_backoff {
            return Err(ConfigError::InvalidValue {
                key: "DEPOT_RETRY_MAX_BACKOFF_MS".to_string(),
                value: config.retry.max_backoff.as_millis().to_string(),
                reason: "must not be below the initial backoff".to_string(),
            });
        }

        Ok(config)
    }

    /// Pool settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone()).max_connections(self.max_connections)
    }
}

fn parse_at_least<T>(key: &str, value: &str, min: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display,
{
    let parsed: T = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: "not a number".to_string(),
    })?;

    if parsed < min {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("must be at least {min}"),
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_overrides() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("DEPOT_DB_PATH", "/var/lib/depot/ledger.db"),
            ("DEPOT_MAX_CONNECTIONS", "8"),
            ("DEPOT_CONFLICT_RETRIES", "3"),
            ("DEPOT_RETRY_MAX_BACKOFF_MS", "50"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/depot/ledger.db"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_backoff, Duration::from_millis(50));
        assert_eq!(config.db_config().max_connections, 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[("DEPOT_CONFLICT_RETRIES", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DEPOT_CONFLICT_RETRIES"));

        assert!(LedgerConfig::from_lookup(lookup(&[("DEPOT_MAX_CONNECTIONS", "many")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[
            ("DEPOT_RETRY_INITIAL_BACKOFF_MS", "100"),
            ("DEPOT_RETRY_MAX_BACKOFF_MS", "10"),
        ]))
        .is_err());
    }
}
