//! Adapters - Implementations of port interfaces.
//!
//! - `actor` - Actor providers for audit stamping
//! - `events` - In-process pipeline, idempotent wrapper, outbox dispatcher
//! - `memory` - In-memory storage for tests and single-process use
//! - `postgres` - PostgreSQL storage and transactional idempotent handler
//! - `redis` - Redis Streams publisher

pub mod actor;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use actor::{with_actor, ScopedActorProvider, StaticActor, SystemActor};
pub use events::{
    DispatchReport, DispatcherState, IdempotentHandler, InMemoryEventBus, OutboxDispatcher,
    OutboxDispatcherConfig,
};
pub use memory::InMemoryStore;
