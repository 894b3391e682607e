//! Closed registry mapping event discriminators to decoders.
//!
//! The outbox stores only a stable string discriminator next to the JSON
//! payload. Every event type the process can dispatch must be registered at
//! startup; anything else is reported as unknown and left in the outbox.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::{DomainError, DomainEvent, ErrorCode, TypedEvent};

type DecodeFn = fn(&JsonValue) -> Result<Arc<dyn DomainEvent>, serde_json::Error>;

/// Errors produced while turning a stored payload back into an event.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No decoder registered for event type '{0}'")]
    UnknownEventType(String),

    #[error("Payload for '{event_type}' could not be decoded: {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<DecodeError> for DomainError {
    fn from(err: DecodeError) -> Self {
        let code = match err {
            DecodeError::UnknownEventType(_) => ErrorCode::UnknownEventType,
            DecodeError::Malformed { .. } => ErrorCode::SerializationError,
        };
        DomainError::new(code, err.to_string())
    }
}

fn decode_as<E: TypedEvent>(payload: &JsonValue) -> Result<Arc<dyn DomainEvent>, serde_json::Error> {
    let event: E = serde_json::from_value(payload.clone())?;
    Ok(Arc::new(event))
}

/// Discriminator → decoder table, populated once at startup.
#[derive(Clone, Default)]
pub struct EventRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` under its `EVENT_TYPE`.
    pub fn register<E: TypedEvent>(&mut self) -> &mut Self {
        self.decoders.insert(E::EVENT_TYPE, decode_as::<E>);
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<E: TypedEvent>(mut self) -> Self {
        self.register::<E>();
        self
    }

    /// Checks whether a discriminator is known.
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Returns every registered discriminator.
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.decoders.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Decodes a stored payload into its concrete event.
    pub fn decode(
        &self,
        event_type: &str,
        payload: &JsonValue,
    ) -> Result<Arc<dyn DomainEvent>, DecodeError> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| DecodeError::UnknownEventType(event_type.to_string()))?;

        decoder(payload).map_err(|source| DecodeError::Malformed {
            event_type: event_type.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::fixtures::{ItemCreated, ItemRenamed};
    use serde_json::json;

    #[test]
    fn decodes_registered_event() {
        let registry = EventRegistry::new().with::<ItemCreated>();
        let original = ItemCreated::new(7);
        let payload = original.to_payload().unwrap();

        let decoded = registry.decode("item.created.v1", &payload).unwrap();

        assert_eq!(decoded.downcast_ref::<ItemCreated>(), Some(&original));
    }

    #[test]
    fn unknown_event_type_is_reported() {
        let registry = EventRegistry::new().with::<ItemCreated>();

        let err = registry
            .decode("item.renamed.v1", &json!({}))
            .unwrap_err();

        assert!(matches!(err, DecodeError::UnknownEventType(ref t) if t == "item.renamed.v1"));
        assert_eq!(DomainError::from(err).code, ErrorCode::UnknownEventType);
    }

    #[test]
    fn malformed_payload_is_reported() {
        let registry = EventRegistry::new().with::<ItemCreated>();

        let err = registry
            .decode("item.created.v1", &json!({"item_id": "seven"}))
            .unwrap_err();

        assert!(matches!(err, DecodeError::Malformed { .. }));
        assert_eq!(DomainError::from(err).code, ErrorCode::SerializationError);
    }

    #[test]
    fn event_types_lists_registrations_sorted() {
        let mut registry = EventRegistry::new();
        registry.register::<ItemRenamed>().register::<ItemCreated>();

        assert_eq!(
            registry.event_types(),
            vec!["item.created.v1", "item.renamed.v1"]
        );
        assert!(registry.contains("item.renamed.v1"));
        assert!(!registry.contains("item.deleted.v1"));
    }
}
