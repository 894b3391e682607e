//! Durable outbox records.
//!
//! An `OutboxMessage` is written in the same transaction as the business
//! change that raised its event, then updated exactly once by the dispatcher
//! when the event has been published. An `OutboxMessageConsumer` row records
//! that one consumer has fully handled one message.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::foundation::{DomainEvent, EventId, Timestamp, TransactionId};

/// An entry in the `outbox_messages` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Same as the originating event id
    pub id: EventId,

    /// Registry discriminator for decoding the payload
    pub event_type: String,

    /// Serialized event
    pub payload: JsonValue,

    /// Aggregate that raised the event
    pub aggregate_type: String,
    pub aggregate_id: String,

    /// Commit that wrote this row
    pub transaction_id: TransactionId,

    /// When the unit of work captured the event; primary dispatch order.
    /// The event's own `occurred_at` stays in the payload.
    pub created_at: Timestamp,

    /// `None` while pending
    pub processed_at: Option<Timestamp>,

    /// Number of failed dispatch attempts
    pub retry_count: u32,

    /// Last dispatch error, if any
    pub last_error: Option<String>,
}

impl OutboxMessage {
    /// Builds a pending message from a raised event captured at `captured_at`.
    pub fn from_event(
        event: &dyn DomainEvent,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        transaction_id: TransactionId,
        captured_at: Timestamp,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: event.event_id(),
            event_type: event.event_type().to_string(),
            payload: event.to_payload()?,
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            transaction_id,
            created_at: captured_at,
            processed_at: None,
            retry_count: 0,
            last_error: None,
        })
    }

    /// Whether the dispatcher still has to publish this message.
    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }

    /// Marks the message as published.
    pub fn mark_processed(&mut self, at: Timestamp) {
        self.processed_at = Some(at);
    }

    /// Records a failed dispatch attempt; the message stays pending.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
    }

    /// Whether a retry cutoff has been reached.
    pub fn attempts_exhausted(&self, max_attempts: Option<u32>) -> bool {
        matches!(max_attempts, Some(max) if self.retry_count >= max)
    }
}

/// An entry in the `outbox_message_consumers` idempotency ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessageConsumer {
    pub message_id: EventId,
    pub consumer_name: String,
    pub processed_at: Timestamp,
}

impl OutboxMessageConsumer {
    pub fn new(message_id: EventId, consumer_name: impl Into<String>) -> Self {
        Self {
            message_id,
            consumer_name: consumer_name.into(),
            processed_at: Timestamp::now(),
        }
    }

    /// Ledger key.
    pub fn key(&self) -> (EventId, &str) {
        (self.message_id, &self.consumer_name)
    }
}
