//! Event delivery adapters.
//!
//! - `InMemoryEventBus` - In-process notification pipeline with typed handlers
//! - `IdempotentHandler` - Wrapper for effectively-once handling per consumer
//! - `OutboxDispatcher` - Background service for reliable event delivery

mod idempotent_handler;
mod in_memory;
mod outbox_dispatcher;

pub use idempotent_handler::IdempotentHandler;
pub use in_memory::InMemoryEventBus;
pub use outbox_dispatcher::{
    DispatchReport, DispatcherState, OutboxDispatcher, OutboxDispatcherConfig,
};
