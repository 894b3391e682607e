//! TransactionalStore port - Atomic write of business rows plus outbox rows.
//!
//! This is the storage half of the Transactional Outbox Pattern. The unit of
//! work hands a complete [`ChangeSet`] to the store, which must persist every
//! entity change and every outbox message in one transaction, or nothing.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::domain::foundation::TransactionId;
use crate::domain::outbox::OutboxMessage;

/// How an entity row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// New row; fails if the key already exists.
    Insert,
    /// Existing row; fails with a concurrency error unless the stored
    /// version still equals `expected_version`.
    Update { expected_version: u64 },
}

/// One business row to write.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub entity_type: String,
    pub entity_id: String,
    pub kind: ChangeKind,
    pub state: JsonValue,
}

impl EntityChange {
    /// Version the row will carry once this change is committed.
    pub fn next_version(&self) -> u64 {
        match self.kind {
            ChangeKind::Insert => 1,
            ChangeKind::Update { expected_version } => expected_version + 1,
        }
    }
}

/// Everything one unit-of-work commit writes.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub transaction_id: TransactionId,
    pub entities: Vec<EntityChange>,
    /// In the order they must be dispatched.
    pub messages: Vec<OutboxMessage>,
}

impl ChangeSet {
    /// Creates an empty change set for a transaction.
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            entities: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.messages.is_empty()
    }
}

/// What the store reports after a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub entities_written: usize,
    /// Messages actually inserted; re-inserting an existing message id is a no-op.
    pub messages_written: usize,
}

/// Storage failures, split so the unit of work can classify them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Concurrency conflict on {entity_type} {entity_id}: {reason}")]
    Concurrency {
        entity_type: String,
        entity_id: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Internal(String),
}

/// Port for committing a change set atomically.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Writes all entity changes and outbox messages in one transaction.
    ///
    /// On any error nothing from the change set may be visible afterwards.
    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError>;
}
