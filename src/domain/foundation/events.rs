//! Event infrastructure for domain event publishing and handling.
//!
//! This module provides the core types and traits for event-driven architecture:
//! - `DomainEvent` - Object-safe trait every raised event implements
//! - `TypedEvent` - Static discriminator used by the event registry
//! - `domain_event!` - Macro to implement both with minimal boilerplate

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::fmt;

use super::{EventId, Timestamp};

// ============================================
// DomainEvent Trait
// ============================================

/// Trait that all domain events must implement.
///
/// Events are immutable once raised and travel as `Arc<dyn DomainEvent>`
/// from the aggregate buffer to the outbox and, after decoding, to handlers.
pub trait DomainEvent: Any + Send + Sync + fmt::Debug + 'static {
    /// Returns the stable discriminator (e.g., "order.created.v1").
    ///
    /// Stored in the outbox and used to find the decoder on the way back.
    fn event_type(&self) -> &'static str;

    /// Returns the unique ID assigned when the event was raised.
    fn event_id(&self) -> EventId;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> Timestamp;

    /// Serializes the event-specific fields for storage.
    fn to_payload(&self) -> Result<JsonValue, serde_json::Error>;

    /// Upcast used for typed dispatch.
    fn as_any(&self) -> &dyn Any;
}

impl dyn DomainEvent {
    /// Returns the concrete event if it is of type `E`.
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Checks whether the concrete event is of type `E`.
    pub fn is<E: DomainEvent>(&self) -> bool {
        self.as_any().is::<E>()
    }
}

/// A concrete, serde-capable event with a compile-time discriminator.
///
/// Only `TypedEvent`s can be registered with the `EventRegistry` or
/// subscribed to with typed handlers.
pub trait TypedEvent: DomainEvent + Serialize + DeserializeOwned + Sized {
    /// The discriminator written to `OutboxMessage::event_type`.
    const EVENT_TYPE: &'static str;
}

/// Macro to implement `DomainEvent` and `TypedEvent` with minimal boilerplate.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct OrderPlaced {
///     pub event_id: EventId,
///     pub order_id: u64,
///     pub placed_at: Timestamp,
/// }
///
/// domain_event!(
///     OrderPlaced,
///     event_type = "order.placed.v1",
///     event_id = event_id,
///     occurred_at = placed_at
/// );
/// ```
#[macro_export]
macro_rules! domain_event {
    (
        $event_name:ident,
        event_type = $event_type:expr,
        event_id = $event_id_field:ident,
        occurred_at = $occurred_field:ident
    ) => {
        impl $crate::domain::foundation::DomainEvent for $event_name {
            fn event_type(&self) -> &'static str {
                $event_type
            }

            fn event_id(&self) -> $crate::domain::foundation::EventId {
                self.$event_id_field
            }

            fn occurred_at(&self) -> $crate::domain::foundation::Timestamp {
                self.$occurred_field
            }

            fn to_payload(
                &self,
            ) -> ::std::result::Result<::serde_json::Value, ::serde_json::Error> {
                ::serde_json::to_value(self)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        impl $crate::domain::foundation::TypedEvent for $event_name {
            const EVENT_TYPE: &'static str = $event_type;
        }
    };
}
