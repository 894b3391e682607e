//! Outbox dispatcher configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Outbox dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatcherConfig {
    /// Maximum rows fetched per poll cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Delay between poll cycles in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Failed attempts after which a row is no longer fetched
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl DispatcherConfig {
    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate dispatcher configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::InvalidPollInterval);
        }
        if self.max_attempts == Some(0) {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: None,
        }
    }
}

fn default_batch_size() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    1000
}
