//! Environment-driven configuration.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// How long to wait between connection attempts while the database comes up.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// First wait, in seconds.
    pub base: f64,
    /// Each subsequent wait is the previous one times this.
    pub multiplier: f64,
    /// Attempts before giving up entirely.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> BackoffConfig {
        BackoffConfig {
            base: 1.0,
            multiplier: 1.5,
            max_retries: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// The SQLite file holding both the data tables and the bookkeeping tables.
    pub database_path: PathBuf,
    /// Directory scanned for descriptor JSON files.
    pub descriptor_directory: PathBuf,
    /// Directory revision files are written to and applied from.
    pub migrations_directory: PathBuf,
    /// How long the monitor loop sleeps between polls.
    pub sleep_interval: Duration,
    pub backoff: BackoffConfig,
}

impl Config {
    /// Read configuration from the environment, falling back to the conventional layout for
    /// anything unset.
    pub fn from_env() -> Result<Config> {
        let database_path = env_or("DATABASE_PATH", "data_resource.sqlite").into();
        let descriptor_directory = env_or("DATA_RESOURCE_PATH", "schema").into();
        let migrations_directory = env_or("MIGRATION_HOME", "migrations/versions").into();
        let sleep_interval =
            Duration::from_secs(env_parsed("DATA_MODEL_SLEEP_INTERVAL", 30u64)?);

        let defaults = BackoffConfig::default();
        let backoff = BackoffConfig {
            base: env_parsed("BACKOFF_BASE_SECONDS", defaults.base)?,
            multiplier: env_parsed("BACKOFF_MULTIPLIER", defaults.multiplier)?,
            max_retries: env_parsed("BACKOFF_MAX_RETRIES", defaults.max_retries)?,
        };

        Ok(Config {
            database_path,
            descriptor_directory,
            migrations_directory,
            sleep_interval,
            backoff,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

fn env_parsed<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an unusable value {:?}: {}", var, v, e)),
        _ => Ok(default),
    }
}
