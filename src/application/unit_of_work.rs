//! UnitOfWork - Commit orchestrator for business changes and their events.
//!
//! A unit of work borrows the entities a request touched, then `commit`:
//!
//! 1. Stamps audit fields on new/modified auditable entities
//! 2. Turns every pending aggregate event into an `OutboxMessage`, in
//!    registration order then raise order, tagged with one transaction id
//! 3. Hands entity rows and outbox rows to the store as one atomic write
//! 4. Clears the aggregates' event buffers, only after the write succeeded
//!
//! Events are never published from here; the outbox dispatcher does that.
//!
//! # Example
//!
//! ```ignore
//! let mut order = Order::place(customer_id, lines)?;
//!
//! let mut uow = UnitOfWork::new(store.clone(), actors.clone());
//! uow.register_new(&mut order);
//! uow.commit(&CancellationToken::new()).await?;
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::aggregate::Entity;
use crate::domain::foundation::{
    Actor, DomainError, ErrorCode, Timestamp, TransactionId,
};
use crate::domain::outbox::OutboxMessage;
use crate::ports::{
    ActorProvider, ChangeKind, ChangeSet, EntityChange, StoreError, TransactionalStore,
};

/// Typed outcome of a failed commit.
///
/// In every case nothing was persisted and the aggregates still hold their
/// pending events, so the same unit of work can be committed again.
#[derive(Debug, Clone, Error)]
pub enum CommitError {
    #[error("A concurrency conflict occurred while saving changes: {0}")]
    Concurrency(String),

    #[error("A database update error occurred: {0}")]
    Database(String),

    #[error("A domain event could not be serialized: {0}")]
    Serialization(String),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),

    #[error("The commit was cancelled before reaching storage")]
    Cancelled,
}

impl CommitError {
    /// Stable error code for callers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::Concurrency(_) => "DbUpdateConcurrencyError",
            CommitError::Database(_) => "DatabaseError",
            CommitError::Serialization(_) => "SerializationError",
            CommitError::Unexpected(_) => "UnexpectedError",
            CommitError::Cancelled => "OperationCancelled",
        }
    }

    /// Whether retrying the same unit of work can succeed without reloading.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommitError::Database(_) | CommitError::Cancelled)
    }
}

impl From<StoreError> for CommitError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Concurrency { .. } => CommitError::Concurrency(err.to_string()),
            StoreError::Database(msg) => CommitError::Database(msg),
            StoreError::Internal(msg) => CommitError::Unexpected(msg),
        }
    }
}

impl From<CommitError> for DomainError {
    fn from(err: CommitError) -> Self {
        let code = match err {
            CommitError::Concurrency(_) => ErrorCode::ConcurrencyConflict,
            CommitError::Database(_) => ErrorCode::DatabaseError,
            CommitError::Serialization(_) => ErrorCode::SerializationError,
            CommitError::Unexpected(_) => ErrorCode::InternalError,
            CommitError::Cancelled => ErrorCode::Cancelled,
        };
        DomainError::new(code, err.to_string())
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub transaction_id: TransactionId,
    pub entities_written: usize,
    pub messages_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Added,
    Modified,
    Unchanged,
}

struct Tracked<'a> {
    entity: &'a mut dyn Entity,
    state: TrackState,
}

/// Tracks borrowed entities and commits them with their events atomically.
pub struct UnitOfWork<'a> {
    store: Arc<dyn TransactionalStore>,
    actors: Arc<dyn ActorProvider>,
    tracked: Vec<Tracked<'a>>,
}

impl<'a> UnitOfWork<'a> {
    /// Creates an empty unit of work.
    pub fn new(store: Arc<dyn TransactionalStore>, actors: Arc<dyn ActorProvider>) -> Self {
        Self {
            store,
            actors,
            tracked: Vec::new(),
        }
    }

    /// Tracks an entity that does not exist in storage yet.
    pub fn register_new<E: Entity + 'a>(&mut self, entity: &'a mut E) -> &mut Self {
        self.track(entity, TrackState::Added)
    }

    /// Tracks a loaded entity whose state changed.
    pub fn register_modified<E: Entity + 'a>(&mut self, entity: &'a mut E) -> &mut Self {
        self.track(entity, TrackState::Modified)
    }

    /// Tracks a loaded aggregate whose row did not change but which may have
    /// raised events.
    pub fn register_unchanged<E: Entity + 'a>(&mut self, entity: &'a mut E) -> &mut Self {
        self.track(entity, TrackState::Unchanged)
    }

    fn track(&mut self, entity: &'a mut dyn Entity, state: TrackState) -> &mut Self {
        self.tracked.push(Tracked { entity, state });
        self
    }

    /// Number of tracked entities.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Number of events waiting to be written to the outbox.
    pub fn pending_event_count(&self) -> usize {
        self.tracked
            .iter()
            .map(|t| t.entity.pending_events().len())
            .sum()
    }

    /// Commits all tracked changes and pending events as one atomic write.
    ///
    /// `cancel` is honoured up to the storage round trip; once the write is
    /// in flight it runs to completion.
    pub async fn commit(&mut self, cancel: &CancellationToken) -> Result<CommitSummary, CommitError> {
        let actor = self.actors.current_actor();
        let actor_name = Actor::audit_name(actor.as_ref()).to_string();
        let transaction_id = TransactionId::new();

        // Last check before tracked entities are touched; nothing below
        // awaits until the store call.
        if cancel.is_cancelled() {
            return Err(CommitError::Cancelled);
        }

        let now = Timestamp::now();
        self.stamp_audit(now, &actor_name);
        let changes = self.build_change_set(transaction_id, now)?;

        if changes.is_empty() {
            debug!(%transaction_id, "Nothing to commit");
            return Ok(CommitSummary {
                transaction_id,
                entities_written: 0,
                messages_written: 0,
            });
        }

        let next_versions: Vec<Option<u64>> = self.next_versions(&changes);

        let receipt = match self.store.commit(changes).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = CommitError::from(e);
                warn!(
                    %transaction_id,
                    code = err.code(),
                    error = %err,
                    "Unit of work commit failed; pending events kept for retry"
                );
                return Err(err);
            }
        };

        for (tracked, next_version) in self.tracked.iter_mut().zip(next_versions) {
            if let Some(version) = next_version {
                tracked.entity.set_version(version);
            }
            tracked.entity.clear_events();
            tracked.state = TrackState::Unchanged;
        }

        info!(
            %transaction_id,
            entities = receipt.entities_written,
            messages = receipt.messages_written,
            actor = %actor_name,
            "Unit of work committed"
        );

        Ok(CommitSummary {
            transaction_id,
            entities_written: receipt.entities_written,
            messages_written: receipt.messages_written,
        })
    }

    fn stamp_audit(&mut self, now: Timestamp, actor: &str) {
        for tracked in self.tracked.iter_mut() {
            let state = tracked.state;
            if let Some(audit) = tracked.entity.audit_mut() {
                match state {
                    TrackState::Added => audit.stamp_created(now, actor),
                    TrackState::Modified => audit.stamp_modified(now, actor),
                    TrackState::Unchanged => {}
                }
            }
        }
    }

    /// Every outbox row gets the same `captured_at`, so insertion order
    /// alone orders one commit's events.
    fn build_change_set(
        &self,
        transaction_id: TransactionId,
        captured_at: Timestamp,
    ) -> Result<ChangeSet, CommitError> {
        let mut changes = ChangeSet::new(transaction_id);

        for tracked in &self.tracked {
            let entity = &*tracked.entity;

            let kind = match tracked.state {
                TrackState::Added => Some(ChangeKind::Insert),
                TrackState::Modified => Some(ChangeKind::Update {
                    expected_version: entity.version(),
                }),
                TrackState::Unchanged => None,
            };

            if let Some(kind) = kind {
                let state = entity.to_state().map_err(|e| {
                    CommitError::Serialization(format!(
                        "{} {}: {}",
                        entity.entity_type(),
                        entity.entity_id(),
                        e
                    ))
                })?;
                changes.entities.push(EntityChange {
                    entity_type: entity.entity_type().to_string(),
                    entity_id: entity.entity_id(),
                    kind,
                    state,
                });
            }

            for event in entity.pending_events() {
                let message = OutboxMessage::from_event(
                    event.as_ref(),
                    entity.entity_type(),
                    entity.entity_id(),
                    transaction_id,
                    captured_at,
                )
                .map_err(|e| {
                    CommitError::Serialization(format!(
                        "{} ({}): {}",
                        event.event_type(),
                        event.event_id(),
                        e
                    ))
                })?;
                changes.messages.push(message);
            }
        }

        Ok(changes)
    }

    /// Version each tracked entity will have after `changes` commits, in
    /// tracking order. `None` for entities without a row change.
    fn next_versions(&self, changes: &ChangeSet) -> Vec<Option<u64>> {
        let mut entity_changes = changes.entities.iter();
        self.tracked
            .iter()
            .map(|t| match t.state {
                TrackState::Unchanged => None,
                TrackState::Added | TrackState::Modified => {
                    entity_changes.next().map(EntityChange::next_version)
                }
            })
            .collect()
    }
}
