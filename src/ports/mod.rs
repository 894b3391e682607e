//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the outbox core and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `TransactionalStore` - Atomic write of business rows and outbox rows
//! - `OutboxStore` - Dispatcher access to pending outbox rows
//! - `ConsumerLedger` - Idempotency tracking for event handlers
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Notification pipeline the dispatcher publishes to
//! - `EventSubscriber` - Registration of typed handlers
//! - `EventHandler` - Handler that processes one event type
//!
//! ## Identity
//!
//! - `ActorProvider` - Current acting identity for audit stamping

mod actor_provider;
mod consumer_ledger;
mod event_publisher;
mod event_subscriber;
mod outbox_store;
mod transactional_store;

pub use actor_provider::ActorProvider;
pub use consumer_ledger::{ConsumerLedger, LedgerInsert};
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventHandler, EventSubscriber};
pub use outbox_store::OutboxStore;
pub use transactional_store::{
    ChangeKind, ChangeSet, CommitReceipt, EntityChange, StoreError, TransactionalStore,
};
