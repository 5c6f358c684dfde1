//! Collector configuration
//!
//! The core consumes exactly four knobs: where the database lives, how often
//! to poll, how long one fetch may take, and how many fetches run in
//! parallel. Everything else (paths, secrets) belongs to the deployment
//! layer.

use crate::error::{AirqError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration surface consumed by the collector core
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Path of the SQLite database file
    pub database_path: PathBuf,
    /// Interval between ingestion cycles
    pub poll_interval: Duration,
    /// Time limit for one provider fetch
    pub fetch_timeout: Duration,
    /// Upper bound on concurrent device fetches per cycle
    pub worker_pool_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./airq.db"),
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            worker_pool_size: 4,
        }
    }
}

impl CollectorConfig {
    /// Defaults overridden by `AIRQ_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("AIRQ_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(secs) = parse_env_u64("AIRQ_POLL_INTERVAL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env_u64("AIRQ_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_env_u64("AIRQ_WORKERS")? {
            config.worker_pool_size = workers as usize;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values no cycle could run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(AirqError::config("poll interval must be non-zero"));
        }
        if self.fetch_timeout.is_zero() {
            return Err(AirqError::config("fetch timeout must be non-zero"));
        }
        if self.worker_pool_size == 0 {
            return Err(AirqError::config("worker pool size must be at least 1"));
        }
        Ok(())
    }
}

fn parse_env_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AirqError::config(format!("invalid {name}: {raw:?}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let config = CollectorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.worker_pool_size, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let config = CollectorConfig {
            worker_pool_size: 0,
            ..CollectorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AirqError::Config(msg)) if msg.contains("worker pool")
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = CollectorConfig {
            poll_interval: Duration::ZERO,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    // Env is process-global, so all from_env coverage lives in this one test.
    #[test]
    fn env_overrides_are_applied_and_malformed_values_rejected() {
        env::set_var("AIRQ_DATABASE_PATH", "/var/lib/airq/airq.db");
        env::set_var("AIRQ_POLL_INTERVAL_SECS", "120");
        env::set_var("AIRQ_FETCH_TIMEOUT_SECS", "5");
        env::set_var("AIRQ_WORKERS", "8");

        let config = CollectorConfig::from_env().unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/airq/airq.db"));
        assert_eq!(config.poll_interval, Duration::from_secs(120));
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.worker_pool_size, 8);

        env::set_var("AIRQ_WORKERS", "abc");
        assert!(matches!(
            CollectorConfig::from_env(),
            Err(AirqError::Config(msg)) if msg.contains("AIRQ_WORKERS")
        ));

        for name in [
            "AIRQ_DATABASE_PATH",
            "AIRQ_POLL_INTERVAL_SECS",
            "AIRQ_FETCH_TIMEOUT_SECS",
            "AIRQ_WORKERS",
        ] {
            env::remove_var(name);
        }
    }
}
