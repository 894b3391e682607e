//! Redis Streams implementation of EventPublisher.
//!
//! Each event is appended with `XADD` to the stream `<prefix>:<event_type>`.
//! Before the first append to a stream, every configured consumer group is
//! created with `XGROUP CREATE ... MKSTREAM`; a `BUSYGROUP` reply means the
//! group already exists and counts as success. Declared streams are cached
//! per publisher, and a publisher owns exactly one connection.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::RedisConfig;
use crate::domain::foundation::{DomainError, DomainEvent, ErrorCode};
use crate::ports::EventPublisher;

/// Opens a multiplexed connection for `config.url`.
pub async fn connect(config: &RedisConfig) -> Result<MultiplexedConnection, DomainError> {
    let client = redis::Client::open(config.url.as_str()).map_err(|e| {
        DomainError::new(ErrorCode::PublishFailed, format!("Invalid Redis URL: {}", e))
    })?;

    tokio::time::timeout(config.timeout(), client.get_multiplexed_tokio_connection())
        .await
        .map_err(|_| {
            DomainError::new(ErrorCode::PublishFailed, "Timed out connecting to Redis")
        })?
        .map_err(|e| {
            DomainError::new(
                ErrorCode::PublishFailed,
                format!("Failed to connect to Redis: {}", e),
            )
        })
}

/// Publishes events to Redis Streams for consumers in other processes.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    conn: MultiplexedConnection,
    stream_prefix: String,
    consumer_groups: Vec<String>,
    declared: Arc<Mutex<HashSet<String>>>,
}

impl RedisStreamPublisher {
    /// Create a publisher with no consumer groups.
    pub fn new(conn: MultiplexedConnection, stream_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            stream_prefix: stream_prefix.into(),
            consumer_groups: Vec::new(),
            declared: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a publisher from configuration.
    pub fn from_config(conn: MultiplexedConnection, config: &RedisConfig) -> Self {
        Self::new(conn, config.stream_prefix.clone()).with_consumer_groups(config.group_names())
    }

    /// Consumer groups to declare on every stream.
    pub fn with_consumer_groups(mut self, groups: Vec<String>) -> Self {
        self.consumer_groups = groups;
        self
    }

    /// Stream that carries events of `event_type`.
    pub fn stream_name(&self, event_type: &str) -> String {
        stream_name(&self.stream_prefix, event_type)
    }

    async fn ensure_declared(&self, stream: &str) -> Result<(), DomainError> {
        let mut declared = self.declared.lock().await;
        if declared.contains(stream) {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        for group in &self.consumer_groups {
            let result: redis::RedisResult<()> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(()) => {
                    tracing::debug!(stream, group = %group, "Created consumer group");
                }
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => {
                    return Err(DomainError::new(
                        ErrorCode::PublishFailed,
                        format!("Failed to declare group {} on {}: {}", group, stream, e),
                    ));
                }
            }
        }

        declared.insert(stream.to_string());
        Ok(())
    }
}

impl std::fmt::Debug for RedisStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamPublisher")
            .field("stream_prefix", &self.stream_prefix)
            .field("consumer_groups", &self.consumer_groups)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<(), DomainError> {
        let stream = self.stream_name(event.event_type());
        let fields = stream_fields(event.as_ref())?;

        self.ensure_declared(&stream).await?;

        let mut conn = self.conn.clone();
        let entry_id: String = conn
            .xadd(&stream, "*", fields.as_slice())
            .await
            .map_err(|e: redis::RedisError| {
                DomainError::new(
                    ErrorCode::PublishFailed,
                    format!("XADD to {} failed: {}", stream, e),
                )
            })?;

        tracing::debug!(
            stream = %stream,
            entry_id = %entry_id,
            event_id = %event.event_id(),
            "Appended event to stream"
        );

        Ok(())
    }
}

fn stream_name(prefix: &str, event_type: &str) -> String {
    format!("{}:{}", prefix, event_type)
}

/// Stream entry fields for an event.
fn stream_fields(event: &dyn DomainEvent) -> Result<Vec<(&'static str, String)>, DomainError> {
    let payload = event.to_payload().map_err(|e| {
        DomainError::new(
            ErrorCode::SerializationError,
            format!("Failed to serialize {}: {}", event.event_type(), e),
        )
    })?;

    Ok(vec![
        ("event_id", event.event_id().to_string()),
        ("event_type", event.event_type().to_string()),
        ("occurred_at", event.occurred_at().as_datetime().to_rfc3339()),
        ("payload", payload.to_string()),
    ])
}
