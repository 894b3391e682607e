//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool needs at least 2 connections: the dispatcher holds one while units of work commit")]
    PoolTooSmall,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Database acquire timeout must be positive")]
    InvalidAcquireTimeout,

    #[error("Dispatcher batch size must be between 1 and 1000")]
    InvalidBatchSize,

    #[error("Dispatcher poll interval must be positive")]
    InvalidPollInterval,

    #[error("Dispatcher max_attempts must be positive when set")]
    InvalidMaxAttempts,

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
