//! EventSubscriber port - Interface for subscribing to domain events.
//!
//! Handlers are typed: an `EventHandler<E>` only ever sees `E`, already
//! decoded from the outbox by the event registry.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, TypedEvent};

/// Handler for processing one concrete event type.
///
/// Implementations should be:
/// - **Idempotent** - or wrapped in `IdempotentHandler`
/// - **Isolated** - Errors don't affect other handlers
///
/// # Example
///
/// ```ignore
/// struct SendWelcomeEmail { /* ... */ }
///
/// #[async_trait]
/// impl EventHandler<UserRegistered> for SendWelcomeEmail {
///     async fn handle(&self, event: &UserRegistered) -> Result<(), DomainError> {
///         self.mailer.send(&event.email).await
///     }
///
///     fn name(&self) -> &'static str {
///         "SendWelcomeEmail"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler<E: TypedEvent>: Send + Sync {
    /// Process an event.
    async fn handle(&self, event: &E) -> Result<(), DomainError>;

    /// Stable handler name.
    ///
    /// Used as the consumer key in the idempotency ledger, so renaming a
    /// handler makes it re-handle messages it already saw.
    fn name(&self) -> &'static str;
}

/// Port for subscribing typed handlers to events.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe a handler to every event of type `E`.
    fn subscribe<E, H>(&self, handler: Arc<H>)
    where
        E: TypedEvent,
        H: EventHandler<E> + 'static;
}
