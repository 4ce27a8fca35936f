//! Configuration for the Slurpee broker, loaded from environment variables.
//!
//! There is no config file layer here (unlike a multi-tenant CMS, Slurpee
//! is meant to run as a single twelve-factor process): every knob in §6 of
//! the broker contract is an environment variable with a sane default.

use std::env;
use std::time::Duration;

/// Top level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            delivery: DeliveryConfig::from_env(),
            logging: LoggingConfig::from_env(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            delivery: DeliveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub admin_secret: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_string("SLURPEE_HOST", "0.0.0.0"),
            port: env_parsed("SLURPEE_PORT", 8080),
            shutdown_timeout_secs: env_parsed("SLURPEE_SHUTDOWN_TIMEOUT_SECS", 30),
            admin_secret: env_string("ADMIN_SECRET", "change-me-in-production"),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub connect_timeout_secs: u64,
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_string("DATABASE_URL", "postgres://localhost/slurpee"),
            pool_min: env_parsed("DATABASE_POOL_MIN", 2),
            pool_max: env_parsed("DATABASE_POOL_MAX", 10),
            connect_timeout_secs: env_parsed("DATABASE_CONNECT_TIMEOUT_SECS", 10),
            run_migrations: env_parsed("DATABASE_RUN_MIGRATIONS", true),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Delivery engine tunables, per §6 of the broker contract.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Default per-subscriber concurrency cap, used when a subscriber row
    /// does not override `max_parallel`.
    pub max_parallel: u32,
    /// Default per-subscription retry budget, used when a subscription does
    /// not override `max_retries`.
    pub max_retries: u32,
    /// Cap on exponential backoff, in seconds.
    pub max_backoff_seconds: u64,
    /// Size of the worker pool draining the task queue.
    pub delivery_workers: usize,
    /// Capacity of the bounded task queue feeding the worker pool.
    pub delivery_queue_size: usize,
    /// Capacity of the ingest channel feeding the dispatcher.
    pub delivery_chan_size: usize,
    /// Per-attempt HTTP timeout.
    pub request_timeout_secs: u64,
    /// Cap on bytes read from a webhook response body.
    pub max_response_body_bytes: usize,
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        Self {
            max_parallel: env_parsed("MAX_PARALLEL", 4),
            max_retries: env_parsed("MAX_RETRIES", 5),
            max_backoff_seconds: env_parsed("MAX_BACKOFF_SECONDS", 300),
            delivery_workers: env_parsed("DELIVERY_WORKERS", 16),
            delivery_queue_size: env_parsed("DELIVERY_QUEUE_SIZE", 1024),
            delivery_chan_size: env_parsed("DELIVERY_CHAN_SIZE", 256),
            request_timeout_secs: env_parsed("DELIVERY_REQUEST_TIMEOUT_SECS", 30),
            max_response_body_bytes: env_parsed("DELIVERY_MAX_RESPONSE_BODY_BYTES", 1024 * 1024),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Logging configuration, consumed by `tracing-subscriber`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env_string("RUST_LOG", "slurpee=info,tower_http=info,sqlx=warn"),
            json: env_parsed("SLURPEE_LOG_JSON", false),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
