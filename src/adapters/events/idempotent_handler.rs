//! IdempotentHandler - Wrapper for effectively-once event handling.
//!
//! This adapter wraps any `EventHandler<E>` and uses a `ConsumerLedger`
//! to ensure each outbox message is handled at most once per consumer.
//!
//! ## Usage
//!
//! ```ignore
//! let handler = IdempotentHandler::new(
//!     ReserveStock::new(inventory),
//!     ledger.clone(),
//! );
//!
//! bus.subscribe::<OrderPlaced, _>(Arc::new(handler));
//! ```
//!
//! ## How It Works
//!
//! 1. Before handling: check the ledger for `(event id, handler name)`
//! 2. If present: skip and return Ok
//! 3. If not: delegate to the inner handler
//! 4. After successful handling: insert the ledger row
//!
//! ## Error Handling
//!
//! - If the inner handler fails, no ledger row is written and the error is
//!   returned, so the next delivery retries
//! - A ledger row that appeared concurrently (`AlreadyRecorded`) is success
//! - Ledger errors are propagated to the caller
//!
//! Handler side effects and the ledger insert are separate writes here. When
//! the side effects live in the same Postgres database, use
//! `PgIdempotentHandler` to put both in one transaction instead.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, TypedEvent};
use crate::ports::{ConsumerLedger, EventHandler, LedgerInsert};

/// Wrapper that ensures at-most-once handling per consumer.
///
/// Uses the inner handler's `name()` as the consumer key.
pub struct IdempotentHandler<H> {
    inner: H,
    ledger: Arc<dyn ConsumerLedger>,
}

impl<H> IdempotentHandler<H> {
    /// Create a new IdempotentHandler wrapping the given handler.
    pub fn new(inner: H, ledger: Arc<dyn ConsumerLedger>) -> Self {
        Self { inner, ledger }
    }

    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<E, H> EventHandler<E> for IdempotentHandler<H>
where
    E: TypedEvent,
    H: EventHandler<E> + 'static,
{
    async fn handle(&self, event: &E) -> Result<(), DomainError> {
        let consumer = self.inner.name();
        let message_id = event.event_id();

        if self.ledger.contains(message_id, consumer).await? {
            tracing::debug!(
                event_id = %message_id,
                handler = consumer,
                "Skipping already handled event"
            );
            return Ok(());
        }

        self.inner.handle(event).await?;

        match self.ledger.record(message_id, consumer).await? {
            LedgerInsert::Inserted => {}
            LedgerInsert::AlreadyRecorded => {
                tracing::debug!(
                    event_id = %message_id,
                    handler = consumer,
                    "Concurrent delivery recorded the event first"
                );
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
