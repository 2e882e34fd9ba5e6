//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::accrual::{AccrualClientConfig, BackoffPolicy};
use crate::domain::ChecksumPolicy;
use crate::jobs::JobSchedulerConfig;

/// Which store adapter backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local; state is lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,

    /// Database connection URL (required for Postgres)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Connection attempts before startup fails
    pub database_connect_attempts: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Deadline for one HTTP request
    pub request_timeout: Duration,

    /// Checksum incoming order numbers must pass
    pub order_checksum: ChecksumPolicy,

    pub accrual: AccrualClientConfig,

    pub scheduler: JobSchedulerConfig,
}

/// Reads one variable at a time; lets tests supply values without touching
/// the process environment
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        (self.lookup)(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(key))
    }

    fn optional(&self, key: &'static str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
            None => Ok(default),
        }
    }

    fn millis_or(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse_or(key, default).map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let store_backend = vars.parse_or("STORE_BACKEND", StoreBackend::Postgres)?;
        let database_url = vars.optional("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let database_max_connections = vars.parse_or("DATABASE_MAX_CONNECTIONS", 10)?;
        let database_connect_attempts = vars.parse_or("DATABASE_CONNECT_ATTEMPTS", 3)?;

        let host = vars.optional("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = vars.parse_or("PORT", 8080)?;
        let environment = vars
            .optional("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string());
        let request_timeout = vars.millis_or("REQUEST_TIMEOUT_MS", 1_000)?;

        let order_checksum = vars.parse_or("ORDER_CHECKSUM", ChecksumPolicy::Luhn)?;

        let base = BackoffPolicy {
            base: vars.millis_or("ACCRUAL_BACKOFF_BASE_MS", 1_000)?,
            multiplier: vars.parse_or("ACCRUAL_BACKOFF_MULTIPLIER", 2.0)?,
            cap: vars.millis_or("ACCRUAL_BACKOFF_CAP_MS", 30_000)?,
            jitter: vars.parse_or("ACCRUAL_BACKOFF_JITTER", 0.2)?,
            max_attempts: 1,
            max_elapsed: vars.millis_or("ACCRUAL_MAX_ELAPSED_MS", 60_000)?,
        };
        if base.multiplier < 1.0 || !(0.0..=1.0).contains(&base.jitter) {
            return Err(ConfigError::InvalidValue(if base.multiplier < 1.0 {
                "ACCRUAL_BACKOFF_MULTIPLIER"
            } else {
                "ACCRUAL_BACKOFF_JITTER"
            }));
        }

        let accrual = AccrualClientConfig {
            base_url: vars.required("ACCRUAL_SYSTEM_ADDRESS")?,
            request_timeout: vars.millis_or("ACCRUAL_REQUEST_TIMEOUT_MS", 5_000)?,
            rate_limit: base
                .clone()
                .with_max_attempts(vars.parse_or("ACCRUAL_RATE_LIMIT_MAX_ATTEMPTS", 5)?),
            retry: base.with_max_attempts(vars.parse_or("ACCRUAL_RETRY_MAX_ATTEMPTS", 3)?),
        };

        let worker_pool_size: usize = vars.parse_or("RECONCILE_WORKERS", 4)?;
        if worker_pool_size == 0 {
            return Err(ConfigError::InvalidValue("RECONCILE_WORKERS"));
        }
        let reconcile_interval = vars.millis_or("RECONCILE_INTERVAL_MS", 2_000)?;
        if reconcile_interval.is_zero() {
            return Err(ConfigError::InvalidValue("RECONCILE_INTERVAL_MS"));
        }
        let scheduler = JobSchedulerConfig {
            reconcile_interval,
            cycle_timeout: vars.millis_or("RECONCILE_CYCLE_TIMEOUT_MS", 30_000)?,
            worker_pool_size,
            batch_limit: vars.parse_or("RECONCILE_BATCH_LIMIT", 1_000)?,
        };

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections,
            database_connect_attempts,
            host,
            port,
            environment,
            request_timeout,
            order_checksum,
            accrual,
            scheduler,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
