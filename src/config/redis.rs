//! Redis Streams configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Redis Streams publishing settings.
///
/// Publishing to Redis is optional; with an empty `url` the relay only uses
/// in-process handlers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL, empty to disable
    #[serde(default)]
    pub url: String,

    /// Streams are named `<stream_prefix>:<event_type>`
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,

    /// Comma-separated consumer groups created on every stream
    #[serde(default)]
    pub consumer_groups: String,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl RedisConfig {
    /// Whether Redis publishing is configured.
    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    /// Consumer group names, trimmed, empty entries dropped.
    pub fn group_names(&self) -> Vec<String> {
        self.consumer_groups
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate Redis configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.stream_prefix.trim().is_empty() {
            return Err(ValidationError::MissingRequired(
                "OUTBOX_RELAY__REDIS__STREAM_PREFIX",
            ));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            stream_prefix: default_stream_prefix(),
            consumer_groups: String::new(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_stream_prefix() -> String {
    "outbox".to_string()
}

fn default_timeout() -> u64 {
    5
}
