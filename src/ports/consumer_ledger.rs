//! ConsumerLedger port - Interface for tracking handled messages per consumer.
//!
//! This port enables idempotent event handling by recording which outbox
//! messages have been fully handled by which consumers. The dispatcher
//! delivers at least once; the ledger turns that into effectively once.
//!
//! ## Why Idempotency Matters
//!
//! Events may be delivered more than once due to:
//! - A publish that succeeded but whose `mark_processed` write failed
//! - Another handler of the same event failing, so the row is retried
//! - Two dispatcher instances racing on the same row

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventId};

/// Outcome of inserting a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    /// This call created the row.
    Inserted,
    /// The row already existed (a concurrent delivery won the race).
    AlreadyRecorded,
}

/// Port for the `(message id, consumer name)` ledger.
///
/// Each consumer has its own rows, allowing different handlers to process
/// the same event independently while staying idempotent per handler.
///
/// # Example
///
/// ```ignore
/// if ledger.contains(event_id, "SendWelcomeEmail").await? {
///     return Ok(()); // Skip duplicate
/// }
///
/// // Handle event...
///
/// ledger.record(event_id, "SendWelcomeEmail").await?;
/// ```
#[async_trait]
pub trait ConsumerLedger: Send + Sync {
    /// Check if a message has been handled by a specific consumer.
    async fn contains(&self, message_id: EventId, consumer: &str) -> Result<bool, DomainError>;

    /// Record that a consumer finished handling a message.
    ///
    /// Must be called only AFTER the handler succeeded. A uniqueness
    /// violation is reported as `AlreadyRecorded`, never as an error.
    async fn record(&self, message_id: EventId, consumer: &str)
        -> Result<LedgerInsert, DomainError>;
}
