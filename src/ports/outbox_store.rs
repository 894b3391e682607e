//! OutboxStore port - Dispatcher-side access to the outbox table.
//!
//! New rows are written only through [`TransactionalStore`](super::TransactionalStore)
//! as part of a unit-of-work commit. This port covers the other half of the
//! pattern:
//!
//! 1. Dispatcher fetches unprocessed rows, oldest first
//! 2. Dispatcher publishes each and marks it processed, one row at a time
//! 3. Failed attempts bump the retry counter so operators can dead-letter

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventId, Timestamp};
use crate::domain::outbox::OutboxMessage;

/// Port for reading and completing outbox messages.
///
/// # Example
///
/// ```ignore
/// let batch = store.fetch_unprocessed(20, None).await?;
/// for message in batch {
///     publish(&message).await?;
///     store.mark_processed(message.id, Timestamp::now()).await?;
/// }
/// ```
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Get up to `limit` messages with no `processed_at`.
    ///
    /// Ordered by `created_at`, ties broken by insertion order. When
    /// `max_attempts` is set, messages with `retry_count >= max_attempts`
    /// are left out.
    async fn fetch_unprocessed(
        &self,
        limit: u32,
        max_attempts: Option<u32>,
    ) -> Result<Vec<OutboxMessage>, DomainError>;

    /// Set `processed_at` on a single message.
    async fn mark_processed(&self, id: EventId, at: Timestamp) -> Result<(), DomainError>;

    /// Increment `retry_count` and store the error; the message stays pending.
    async fn record_failure(&self, id: EventId, error: &str) -> Result<(), DomainError>;

    /// Look up a single message.
    async fn find(&self, id: EventId) -> Result<Option<OutboxMessage>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn OutboxStore) {}
}
