//! In-memory storage implementing every storage port.
//!
//! Entity rows, outbox rows, and ledger rows live behind one
//! `tokio::sync::Mutex`, so a `commit` is all-or-nothing: it validates the
//! whole change set before touching any table. Suitable for tests and
//! single-process deployments.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, EventId, Timestamp};
use crate::domain::outbox::{OutboxMessage, OutboxMessageConsumer};
use crate::ports::{
    ChangeKind, ChangeSet, CommitReceipt, ConsumerLedger, LedgerInsert, OutboxStore, StoreError,
    TransactionalStore,
};

/// A persisted business row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub entity_type: String,
    pub entity_id: String,
    pub version: u64,
    pub state: JsonValue,
}

#[derive(Debug, Default)]
struct Tables {
    entities: HashMap<(String, String), StoredEntity>,
    /// Outbox rows with their insertion sequence.
    outbox: Vec<(u64, OutboxMessage)>,
    next_seq: u64,
    consumers: HashMap<(EventId, String), OutboxMessageConsumer>,
}

impl Tables {
    fn message_mut(&mut self, id: EventId) -> Option<&mut OutboxMessage> {
        self.outbox
            .iter_mut()
            .map(|(_, m)| m)
            .find(|m| m.id == id)
    }

    fn contains_message(&self, id: EventId) -> bool {
        self.outbox.iter().any(|(_, m)| m.id == id)
    }
}

/// One-shot failures consumed by the next matching call.
#[derive(Debug, Default)]
struct Faults {
    commit: Option<StoreError>,
    fetch: Option<DomainError>,
    mark_processed: Option<DomainError>,
}

/// In-memory implementation of `TransactionalStore`, `OutboxStore` and
/// `ConsumerLedger`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // === Fault injection ===

    /// Make the next `commit` fail with `error` without writing anything.
    pub async fn fail_next_commit(&self, error: StoreError) {
        self.faults.lock().await.commit = Some(error);
    }

    /// Make the next `fetch_unprocessed` fail.
    pub async fn fail_next_fetch(&self, error: DomainError) {
        self.faults.lock().await.fetch = Some(error);
    }

    /// Make the next `mark_processed` fail.
    pub async fn fail_next_mark_processed(&self, error: DomainError) {
        self.faults.lock().await.mark_processed = Some(error);
    }

    // === Inspection ===

    /// Look up a business row.
    pub async fn entity(&self, entity_type: &str, entity_id: &str) -> Option<StoredEntity> {
        self.tables
            .lock()
            .await
            .entities
            .get(&(entity_type.to_string(), entity_id.to_string()))
            .cloned()
    }

    /// All outbox rows, processed or not, in insertion order.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.tables
            .lock()
            .await
            .outbox
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of outbox rows still waiting for the dispatcher.
    pub async fn pending_count(&self) -> usize {
        self.tables
            .lock()
            .await
            .outbox
            .iter()
            .filter(|(_, m)| m.is_pending())
            .count()
    }

    /// All ledger rows.
    pub async fn consumer_rows(&self) -> Vec<OutboxMessageConsumer> {
        self.tables
            .lock()
            .await
            .consumers
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        if let Some(error) = self.faults.lock().await.commit.take() {
            return Err(error);
        }

        let mut tables = self.tables.lock().await;

        // Validate everything before applying anything.
        for change in &changes.entities {
            let key = (change.entity_type.clone(), change.entity_id.clone());
            match (change.kind, tables.entities.get(&key)) {
                (ChangeKind::Insert, Some(_)) => {
                    return Err(StoreError::Database(format!(
                        "duplicate key for {} {}",
                        change.entity_type, change.entity_id
                    )));
                }
                (ChangeKind::Insert, None) => {}
                (ChangeKind::Update { .. }, None) => {
                    return Err(StoreError::Concurrency {
                        entity_type: change.entity_type.clone(),
                        entity_id: change.entity_id.clone(),
                        reason: "row no longer exists".to_string(),
                    });
                }
                (ChangeKind::Update { expected_version }, Some(stored)) => {
                    if stored.version != expected_version {
                        return Err(StoreError::Concurrency {
                            entity_type: change.entity_type.clone(),
                            entity_id: change.entity_id.clone(),
                            reason: format!(
                                "expected version {}, found {}",
                                expected_version, stored.version
                            ),
                        });
                    }
                }
            }
        }

        let mut receipt = CommitReceipt::default();

        for change in changes.entities {
            let version = change.next_version();
            let key = (change.entity_type.clone(), change.entity_id.clone());
            tables.entities.insert(
                key,
                StoredEntity {
                    entity_type: change.entity_type,
                    entity_id: change.entity_id,
                    version,
                    state: change.state,
                },
            );
            receipt.entities_written += 1;
        }

        for message in changes.messages {
            if tables.contains_message(message.id) {
                continue;
            }
            let seq = tables.next_seq;
            tables.next_seq += 1;
            tables.outbox.push((seq, message));
            receipt.messages_written += 1;
        }

        Ok(receipt)
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn fetch_unprocessed(
        &self,
        limit: u32,
        max_attempts: Option<u32>,
    ) -> Result<Vec<OutboxMessage>, DomainError> {
        if let Some(error) = self.faults.lock().await.fetch.take() {
            return Err(error);
        }

        let tables = self.tables.lock().await;
        let mut pending: Vec<&(u64, OutboxMessage)> = tables
            .outbox
            .iter()
            .filter(|(_, m)| m.is_pending() && !m.attempts_exhausted(max_attempts))
            .collect();
        pending.sort_by_key(|(seq, m)| (m.created_at, *seq));

        Ok(pending
            .into_iter()
            .take(limit as usize)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn mark_processed(&self, id: EventId, at: Timestamp) -> Result<(), DomainError> {
        if let Some(error) = self.faults.lock().await.mark_processed.take() {
            return Err(error);
        }

        let mut tables = self.tables.lock().await;
        let message = tables.message_mut(id).ok_or_else(|| not_found(id))?;
        if message.is_pending() {
            message.mark_processed(at);
        }
        Ok(())
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        let message = tables.message_mut(id).ok_or_else(|| not_found(id))?;
        message.record_failure(error);
        Ok(())
    }

    async fn find(&self, id: EventId) -> Result<Option<OutboxMessage>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .outbox
            .iter()
            .map(|(_, m)| m)
            .find(|m| m.id == id)
            .cloned())
    }
}

#[async_trait]
impl ConsumerLedger for InMemoryStore {
    async fn contains(&self, message_id: EventId, consumer: &str) -> Result<bool, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .consumers
            .contains_key(&(message_id, consumer.to_string())))
    }

    async fn record(
        &self,
        message_id: EventId,
        consumer: &str,
    ) -> Result<LedgerInsert, DomainError> {
        let mut tables = self.tables.lock().await;
        let key = (message_id, consumer.to_string());
        if tables.consumers.contains_key(&key) {
            return Ok(LedgerInsert::AlreadyRecorded);
        }
        tables
            .consumers
            .insert(key, OutboxMessageConsumer::new(message_id, consumer));
        Ok(LedgerInsert::Inserted)
    }
}

fn not_found(id: EventId) -> DomainError {
    DomainError::new(
        ErrorCode::MessageNotFound,
        format!("Outbox message {} not found", id),
    )
}
