//! Application layer - Commit orchestration.
//!
//! The unit of work coordinates the storage and identity ports so that a
//! business change and the events it raised are persisted together.

pub mod unit_of_work;

pub use unit_of_work::{CommitError, CommitSummary, UnitOfWork};
