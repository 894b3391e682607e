//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `OUTBOX_RELAY` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use outbox_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Dispatching {} rows per cycle", config.dispatcher.batch_size);
//! ```

mod database;
mod dispatcher;
mod error;
mod redis;
mod telemetry;

pub use database::DatabaseConfig;
pub use dispatcher::DispatcherConfig;
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use telemetry::TelemetryConfig;

use serde::Deserialize;

/// Root configuration for the outbox relay.
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection for entity, outbox and ledger tables
    pub database: DatabaseConfig,

    /// Polling and retry policy
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Optional Redis Streams publishing
    #[serde(default)]
    pub redis: RedisConfig,

    /// Log filter and format
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with the `OUTBOX_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `OUTBOX_RELAY__DATABASE__URL=...` -> `database.url = ...`
    /// - `OUTBOX_RELAY__DISPATCHER__BATCH_SIZE=50` -> `dispatcher.batch_size = 50`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("OUTBOX_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.dispatcher.validate()?;
        self.redis.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "OUTBOX_RELAY__DATABASE__URL",
        "OUTBOX_RELAY__DISPATCHER__BATCH_SIZE",
        "OUTBOX_RELAY__DISPATCHER__POLL_INTERVAL_MS",
        "OUTBOX_RELAY__DISPATCHER__MAX_ATTEMPTS",
        "OUTBOX_RELAY__REDIS__URL",
        "OUTBOX_RELAY__REDIS__CONSUMER_GROUPS",
        "OUTBOX_RELAY__TELEMETRY__JSON",
    ];

    fn set_minimal_env() {
        env::set_var("OUTBOX_RELAY__DATABASE__URL", "postgresql://test@localhost/test");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.dispatcher, DispatcherConfig::default());
        assert!(!config.redis.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dispatcher_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("OUTBOX_RELAY__DISPATCHER__BATCH_SIZE", "50");
        env::set_var("OUTBOX_RELAY__DISPATCHER__POLL_INTERVAL_MS", "250");
        env::set_var("OUTBOX_RELAY__DISPATCHER__MAX_ATTEMPTS", "5");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.dispatcher.batch_size, 50);
        assert_eq!(config.dispatcher.poll_interval_ms, 250);
        assert_eq!(config.dispatcher.max_attempts, Some(5));
    }

    #[test]
    fn test_redis_section() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("OUTBOX_RELAY__REDIS__URL", "redis://localhost:6379");
        env::set_var("OUTBOX_RELAY__REDIS__CONSUMER_GROUPS", "billing,audit");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.redis.is_enabled());
        assert_eq!(config.redis.group_names(), vec!["billing", "audit"]);
    }

    #[test]
    fn test_missing_database_url_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_invalid_dispatcher_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("OUTBOX_RELAY__DISPATCHER__BATCH_SIZE", "0");
        let result = AppConfig::load_validated();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::ValidationFailed(ValidationError::InvalidBatchSize))
        ));
    }
}
