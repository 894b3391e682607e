//! Outbox Relay - Transactional outbox for aggregate-oriented services.
//!
//! Aggregates buffer domain events, the unit of work commits them to an
//! outbox in the same transaction as the business change, a background
//! dispatcher publishes them, and idempotent handlers consume them
//! effectively once.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
