//! Domain layer containing the outbox vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, events, registry)
//! - `aggregate` - Event buffering and the entity contract tracked by the unit of work
//! - `outbox` - Durable outbox and consumer-ledger records

pub mod aggregate;
pub mod foundation;
pub mod outbox;
