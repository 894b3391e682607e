//! Aggregate event buffering and the entity contract used by the unit of work.
//!
//! Aggregates record the events their business methods cause into an
//! [`EventBuffer`]. The buffer is only drained by the unit of work, after the
//! outbox rows for those events have been durably committed.
//!
//! # Example
//!
//! ```ignore
//! pub struct Order {
//!     id: u64,
//!     version: u64,
//!     audit: AuditInfo,
//!     events: EventBuffer,
//! }
//!
//! impl Order {
//!     pub fn place(id: u64) -> Self {
//!         let mut order = Order { id, version: 0, audit: AuditInfo::default(), events: EventBuffer::new() };
//!         order.events.raise(OrderPlaced::new(id));
//!         order
//!     }
//! }
//! ```

use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::foundation::{AuditInfo, DomainEvent};

/// Ordered list of events raised by one aggregate and not yet persisted.
///
/// Insertion order is the causal order within the aggregate.
#[derive(Debug, Default, Clone)]
pub struct EventBuffer {
    pending: Vec<Arc<dyn DomainEvent>>,
}

impl EventBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn raise<E: DomainEvent>(&mut self, event: E) {
        self.pending.push(Arc::new(event));
    }

    /// Pending events in raise order. Non-destructive.
    pub fn pending(&self) -> &[Arc<dyn DomainEvent>] {
        &self.pending
    }

    /// Drops every pending event.
    ///
    /// Only call after the events have been recorded durably.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A persistable business object tracked by the unit of work.
///
/// Plain entities implement the required methods. Auditable entities also
/// override [`audit_mut`](Entity::audit_mut); aggregates override
/// [`pending_events`](Entity::pending_events) and
/// [`clear_events`](Entity::clear_events), usually by delegating to an
/// [`EventBuffer`].
pub trait Entity: Send + Sync {
    /// Logical table/type name (e.g., "Order").
    fn entity_type(&self) -> &'static str;

    /// Identifier unique within `entity_type`.
    fn entity_id(&self) -> String;

    /// Optimistic concurrency token. 0 for an entity never persisted.
    fn version(&self) -> u64;

    /// Records the version assigned by storage after a successful commit.
    fn set_version(&mut self, version: u64);

    /// Serialized business row.
    fn to_state(&self) -> Result<JsonValue, serde_json::Error>;

    /// Audit metadata, for auditable entities.
    fn audit_mut(&mut self) -> Option<&mut AuditInfo> {
        None
    }

    /// Events raised and not yet recorded in the outbox.
    fn pending_events(&self) -> &[Arc<dyn DomainEvent>] {
        &[]
    }

    /// Clears the pending events after durable persistence.
    fn clear_events(&mut self) {}
}
