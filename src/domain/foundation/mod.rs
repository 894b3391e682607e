//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, error types, actor identity, audit
//! metadata and the event vocabulary shared by the rest of the crate.

mod actor;
mod audit;
mod errors;
mod events;
mod ids;
mod registry;
mod timestamp;

pub use actor::{Actor, SYSTEM_ACTOR};
pub use audit::AuditInfo;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, TypedEvent};
pub use ids::{EventId, TransactionId};
pub use registry::{DecodeError, EventRegistry};
pub use timestamp::Timestamp;

#[cfg(test)]
pub(crate) use events::fixtures;
