//! In-memory storage adapter.
//!
//! A single store backs the unit of work, the dispatcher and the idempotency
//! ledger, with one-shot fault injection for tests.

mod store;

pub use store::{InMemoryStore, StoredEntity};
