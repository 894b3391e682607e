//! EventPublisher port - Interface for the notification pipeline.
//!
//! The dispatcher hands every decoded outbox event to this port without
//! knowing about the underlying transport (in-process handlers, Redis
//! streams, etc.).

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, DomainEvent};

/// Port for publishing domain events.
///
/// Implementations must ensure:
/// - Events are delivered at-least-once (handlers may receive duplicates)
/// - A failure is returned as `Err`, never as a panic, so the dispatcher can
///   keep the row pending and carry on with the rest of the batch
///
/// # Example
///
/// ```ignore
/// let event = registry.decode(&message.event_type, &message.payload)?;
/// publisher.publish(event).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event to zero or more subscribers.
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn EventPublisher) {}
}
