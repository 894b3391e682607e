//! OutboxDispatcher - Background service for reliable event delivery.
//!
//! This service implements the second half of the Transactional Outbox Pattern:
//! 1. The unit of work writes events to the outbox (same transaction as domain changes)
//! 2. **OutboxDispatcher polls the outbox and publishes each event** ← This module
//!
//! Every row is decoded through the `EventRegistry`, handed to the
//! `EventPublisher`, and marked processed on its own. A row that cannot be
//! decoded or published gets its retry counter bumped and stays pending, so
//! one bad row never blocks the rest of the batch.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 1s | How often to check for unprocessed rows |
//! | `batch_size` | 20 | Max rows to publish per poll cycle |
//! | `max_attempts` | none | Rows with this many failures are no longer fetched |
//!
//! ## Shutdown
//!
//! `run` returns when its `CancellationToken` fires. A cycle in flight stops
//! before its next row; rows already marked stay processed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::domain::foundation::{DomainError, ErrorCode, EventRegistry, Timestamp};
use crate::domain::outbox::OutboxMessage;
use crate::ports::{EventPublisher, OutboxStore};

/// Configuration for the OutboxDispatcher service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxDispatcherConfig {
    /// How often to poll for unprocessed rows.
    pub poll_interval: Duration,

    /// Maximum rows to process per poll cycle.
    pub batch_size: u32,

    /// Failed attempts after which a row is left for operators.
    pub max_attempts: Option<u32>,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 20,
            max_attempts: None,
        }
    }
}

impl OutboxDispatcherConfig {
    /// Create config with custom poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create config with custom batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Create config with a retry cutoff.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Rejects settings the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.poll_interval.is_zero() {
            return Err(invalid_config("poll_interval must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid_config("batch_size must be greater than zero"));
        }
        if self.max_attempts == Some(0) {
            return Err(invalid_config("max_attempts must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid_config(message: &str) -> DomainError {
    DomainError::new(ErrorCode::ValidationFailed, message)
}

impl From<&DispatcherConfig> for OutboxDispatcherConfig {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
        }
    }
}

/// Where the dispatcher is within a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Polling,
    BatchFetched,
    Publishing,
    BatchComplete,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Rows returned by the fetch
    pub fetched: usize,
    /// Rows published and marked processed
    pub published: usize,
    /// Rows whose publish or completion failed
    pub failed: usize,
    /// Rows that could not be decoded
    pub skipped: usize,
    /// Rows left untouched because the cycle was cancelled
    pub cancelled: usize,
}

impl DispatchReport {
    /// Rows from this cycle that are still pending.
    pub fn still_pending(&self) -> usize {
        self.failed + self.skipped + self.cancelled
    }
}

/// Background service that publishes events from the outbox.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    registry: Arc<EventRegistry>,
    publisher: Arc<dyn EventPublisher>,
    config: OutboxDispatcherConfig,
    state: watch::Sender<DispatcherState>,
}

impl OutboxDispatcher {
    /// Create a new OutboxDispatcher with default configuration.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        registry: Arc<EventRegistry>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_config(outbox, registry, publisher, OutboxDispatcherConfig::default())
    }

    /// Create a new OutboxDispatcher with custom configuration.
    pub fn with_config(
        outbox: Arc<dyn OutboxStore>,
        registry: Arc<EventRegistry>,
        publisher: Arc<dyn EventPublisher>,
        config: OutboxDispatcherConfig,
    ) -> Self {
        let (state, _) = watch::channel(DispatcherState::Idle);
        Self {
            outbox,
            registry,
            publisher,
            config,
            state,
        }
    }

    pub fn config(&self) -> &OutboxDispatcherConfig {
        &self.config
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Run the dispatch loop until `shutdown` is cancelled.
    ///
    /// Errors from a single cycle are logged and the loop keeps polling.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DomainError> {
        self.config.validate()?;

        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Outbox dispatcher started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.set_state(DispatcherState::Idle);
                    info!("Outbox dispatcher stopped");
                    return Ok(());
                }

                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_once(&shutdown).await {
                        error!(error = %e, "Outbox dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// Run exactly one poll cycle.
    ///
    /// Only a failed fetch is returned as an error; per-row failures are
    /// counted in the report and logged.
    pub async fn dispatch_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DomainError> {
        self.config.validate()?;
        self.set_state(DispatcherState::Polling);

        let batch = match self
            .outbox
            .fetch_unprocessed(self.config.batch_size, self.config.max_attempts)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                self.set_state(DispatcherState::Idle);
                return Err(e);
            }
        };

        let mut report = DispatchReport {
            fetched: batch.len(),
            ..DispatchReport::default()
        };

        if batch.is_empty() {
            self.set_state(DispatcherState::Idle);
            return Ok(report);
        }

        self.set_state(DispatcherState::BatchFetched);
        debug!(count = batch.len(), "Fetched outbox batch");
        self.set_state(DispatcherState::Publishing);

        for (index, message) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = batch.len() - index;
                break;
            }

            let event = match self.registry.decode(&message.event_type, &message.payload) {
                Ok(event) => event,
                Err(e) => {
                    let e = DomainError::from(e);
                    warn!(
                        event_id = %message.id,
                        event_type = %message.event_type,
                        code = %e.code,
                        error = %e,
                        "Skipping undecodable outbox message"
                    );
                    self.record_failure(message, &e.to_string()).await;
                    report.skipped += 1;
                    continue;
                }
            };

            if let Err(e) = self.publisher.publish(event).await {
                warn!(
                    event_id = %message.id,
                    event_type = %message.event_type,
                    retry_count = message.retry_count + 1,
                    error = %e,
                    "Failed to publish outbox message"
                );
                self.record_failure(message, &e.to_string()).await;
                report.failed += 1;
                continue;
            }

            match self.outbox.mark_processed(message.id, Timestamp::now()).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    // Published but still pending: the row will be delivered again.
                    warn!(
                        event_id = %message.id,
                        error = %e,
                        "Failed to mark outbox message processed"
                    );
                    self.record_failure(message, &e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        self.set_state(DispatcherState::BatchComplete);
        info!(
            fetched = report.fetched,
            published = report.published,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Outbox batch complete"
        );
        self.set_state(DispatcherState::Idle);

        Ok(report)
    }

    async fn record_failure(&self, message: &OutboxMessage, error: &str) {
        if let Err(e) = self.outbox.record_failure(message.id, error).await {
            warn!(
                event_id = %message.id,
                error = %e,
                "Failed to record outbox failure"
            );
        }
    }

    fn set_state(&self, state: DispatcherState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::foundation::fixtures::{ItemCreated, ItemRenamed};
    use crate::domain::foundation::{DomainEvent, TransactionId};
    use crate::ports::{ChangeSet, EventHandler, EventSubscriber, TransactionalStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn registry() -> Arc<EventRegistry> {
        Arc::new(
            EventRegistry::new()
                .with::<ItemCreated>()
                .with::<ItemRenamed>(),
        )
    }

    async fn seed(store: &InMemoryStore, messages: Vec<OutboxMessage>) {
        let mut changes = ChangeSet::new(TransactionId::new());
        changes.messages = messages;
        store.commit(changes).await.unwrap();
    }

    fn created(item_id: u64, offset_ms: i64) -> OutboxMessage {
        let event = ItemCreated::new(item_id);
        OutboxMessage::from_event(
            &event,
            "Item",
            item_id.to_string(),
            TransactionId::new(),
            Timestamp::now().plus_millis(offset_ms),
        )
        .unwrap()
    }

    /// Fails for one item id while `failing` is set.
    struct FlakyHandler {
        item_id: u64,
        failing: AtomicBool,
    }

    #[async_trait]
    impl EventHandler<ItemCreated> for FlakyHandler {
        async fn handle(&self, event: &ItemCreated) -> Result<(), DomainError> {
            if event.item_id == self.item_id && self.failing.load(Ordering::SeqCst) {
                return Err(DomainError::new(ErrorCode::InternalError, "flaky"));
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "FlakyHandler"
        }
    }

    fn dispatcher(store: &Arc<InMemoryStore>, bus: &Arc<InMemoryEventBus>) -> OutboxDispatcher {
        OutboxDispatcher::new(store.clone(), registry(), bus.clone())
    }

    #[tokio::test]
    async fn dispatch_once_publishes_pending_messages_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let first = created(1, 0);
        let second = created(2, 5);
        // Inserted out of order on purpose.
        seed(&store, vec![second.clone(), first.clone()]).await;

        let report = dispatcher(&store, &bus)
            .dispatch_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.published, 2);
        assert_eq!(bus.published_ids(), vec![first.id, second.id]);
        assert!(store.fetch_unprocessed(10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_once_respects_batch_size() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        seed(&store, (0..5).map(|i| created(i, i as i64)).collect()).await;

        let config = OutboxDispatcherConfig::default().with_batch_size(2);
        let dispatcher =
            OutboxDispatcher::with_config(store.clone(), registry(), bus.clone(), config);
        let cancel = CancellationToken::new();

        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().published, 2);
        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().published, 2);
        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().published, 1);
        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().fetched, 0);
    }

    #[tokio::test]
    async fn empty_outbox_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());

        let report = dispatcher(&store, &bus)
            .dispatch_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, DispatchReport::default());
        assert_eq!(bus.event_count(), 0);
    }

    #[tokio::test]
    async fn failed_row_does_not_block_the_rest_of_the_batch() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let handler = Arc::new(FlakyHandler {
            item_id: 2,
            failing: AtomicBool::new(true),
        });
        bus.subscribe::<ItemCreated, _>(handler.clone());

        let rows = vec![created(1, 0), created(2, 1), created(3, 2)];
        seed(&store, rows.clone()).await;
        let dispatcher = dispatcher(&store, &bus);
        let cancel = CancellationToken::new();

        let report = dispatcher.dispatch_once(&cancel).await.unwrap();

        assert_eq!(report.published, 2);
        assert_eq!(report.failed, 1);
        let failed = store.find(rows[1].id).await.unwrap().unwrap();
        assert!(failed.is_pending());
        assert_eq!(failed.retry_count, 1);
        assert!(failed.last_error.is_some());
        assert!(!store.find(rows[0].id).await.unwrap().unwrap().is_pending());
        assert!(!store.find(rows[2].id).await.unwrap().unwrap().is_pending());

        // Next cycle retries only the failed row.
        handler.failing.store(false, Ordering::SeqCst);
        let report = dispatcher.dispatch_once(&cancel).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn unknown_event_type_stays_pending_with_retry_count() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let mut unknown = created(1, 0);
        unknown.event_type = "item.deleted.v1".to_string();
        seed(&store, vec![unknown.clone()]).await;
        let dispatcher = dispatcher(&store, &bus);
        let cancel = CancellationToken::new();

        let report = dispatcher.dispatch_once(&cancel).await.unwrap();
        dispatcher.dispatch_once(&cancel).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(bus.event_count(), 0);
        let row = store.find(unknown.id).await.unwrap().unwrap();
        assert!(row.is_pending());
        assert_eq!(row.retry_count, 2);
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let mut broken = created(1, 0);
        broken.payload = json!({ "item_id": "not a number" });
        seed(&store, vec![broken.clone(), created(2, 1)]).await;

        let report = dispatcher(&store, &bus)
            .dispatch_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.published, 1);
        assert!(store.find(broken.id).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn exhausted_rows_are_not_fetched() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let mut unknown = created(1, 0);
        unknown.event_type = "item.deleted.v1".to_string();
        seed(&store, vec![unknown]).await;

        let config = OutboxDispatcherConfig::default().with_max_attempts(2);
        let dispatcher =
            OutboxDispatcher::with_config(store.clone(), registry(), bus.clone(), config);
        let cancel = CancellationToken::new();

        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().skipped, 1);
        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().skipped, 1);
        assert_eq!(dispatcher.dispatch_once(&cancel).await.unwrap().fetched, 0);
    }

    #[tokio::test]
    async fn cancellation_leaves_remaining_rows_untouched() {
        struct CancelOnFirst(CancellationToken);

        #[async_trait]
        impl EventHandler<ItemCreated> for CancelOnFirst {
            async fn handle(&self, _: &ItemCreated) -> Result<(), DomainError> {
                self.0.cancel();
                Ok(())
            }

            fn name(&self) -> &'static str {
                "CancelOnFirst"
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let cancel = CancellationToken::new();
        bus.subscribe::<ItemCreated, _>(Arc::new(CancelOnFirst(cancel.clone())));
        let rows = vec![created(1, 0), created(2, 1), created(3, 2)];
        seed(&store, rows.clone()).await;

        let report = dispatcher(&store, &bus).dispatch_once(&cancel).await.unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(report.cancelled, 2);
        let untouched = store.find(rows[2].id).await.unwrap().unwrap();
        assert!(untouched.is_pending());
        assert_eq!(untouched.retry_count, 0);
    }

    #[tokio::test]
    async fn mark_failure_keeps_row_pending_for_redelivery() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let row = created(1, 0);
        seed(&store, vec![row.clone()]).await;
        store
            .fail_next_mark_processed(DomainError::new(ErrorCode::DatabaseError, "lost"))
            .await;
        let dispatcher = dispatcher(&store, &bus);
        let cancel = CancellationToken::new();

        let report = dispatcher.dispatch_once(&cancel).await.unwrap();
        assert_eq!(report.failed, 1);
        let stored = store.find(row.id).await.unwrap().unwrap();
        assert!(stored.is_pending());
        assert_eq!(stored.retry_count, 1);
        assert!(stored.last_error.unwrap().contains("lost"));

        // Delivered again on the next cycle.
        dispatcher.dispatch_once(&cancel).await.unwrap();
        assert_eq!(bus.published_ids(), vec![row.id, row.id]);
    }

    #[tokio::test]
    async fn fetch_error_is_returned_and_state_resets() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        store
            .fail_next_fetch(DomainError::new(ErrorCode::DatabaseError, "down"))
            .await;
        let dispatcher = dispatcher(&store, &bus);
        let state = dispatcher.state();

        let result = dispatcher.dispatch_once(&CancellationToken::new()).await;

        assert!(result.is_err());
        assert_eq!(*state.borrow(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn run_survives_failed_cycle_and_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let row = created(1, 0);
        seed(&store, vec![row.clone()]).await;
        store
            .fail_next_fetch(DomainError::new(ErrorCode::DatabaseError, "down"))
            .await;

        let config = OutboxDispatcherConfig::default()
            .with_poll_interval(Duration::from_millis(10));
        let dispatcher = Arc::new(OutboxDispatcher::with_config(
            store.clone(),
            registry(),
            bus.clone(),
            config,
        ));
        let shutdown = CancellationToken::new();

        let handle = {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { dispatcher.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown.cancel();

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(bus.published_ids(), vec![row.id]);
        assert_eq!(*dispatcher.state().borrow(), DispatcherState::Idle);
    }

    #[tokio::test]
    async fn decoded_event_matches_original() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let event = ItemRenamed::new(4, "widget");
        let row = OutboxMessage::from_event(
            &event,
            "Item",
            "4",
            TransactionId::new(),
            Timestamp::now(),
        )
        .unwrap();
        seed(&store, vec![row]).await;

        dispatcher(&store, &bus)
            .dispatch_once(&CancellationToken::new())
            .await
            .unwrap();

        let published = bus.published_events();
        let decoded = published[0].downcast_ref::<ItemRenamed>().unwrap();
        assert_eq!(decoded, &event);
        assert_eq!(published[0].event_id(), event.event_id());
    }

    #[test]
    fn config_defaults_match_dispatch_policy() {
        let config = OutboxDispatcherConfig::default();

        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.max_attempts, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_values_that_cannot_dispatch() {
        let zero_interval = OutboxDispatcherConfig::default().with_poll_interval(Duration::ZERO);
        let zero_batch = OutboxDispatcherConfig::default().with_batch_size(0);
        let zero_attempts = OutboxDispatcherConfig::default().with_max_attempts(0);

        for config in [zero_interval, zero_batch, zero_attempts] {
            let err = config.validate().unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed);
        }
    }

    #[tokio::test]
    async fn run_with_zero_interval_returns_error() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let config = OutboxDispatcherConfig::default().with_poll_interval(Duration::ZERO);
        let dispatcher =
            OutboxDispatcher::with_config(store.clone(), registry(), bus.clone(), config);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = dispatcher.run(shutdown).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn dispatch_once_with_zero_batch_returns_error() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        seed(&store, vec![created(1, 0)]).await;
        let config = OutboxDispatcherConfig::default().with_batch_size(0);
        let dispatcher =
            OutboxDispatcher::with_config(store.clone(), registry(), bus.clone(), config);

        let result = dispatcher.dispatch_once(&CancellationToken::new()).await;

        assert!(result.is_err());
        assert_eq!(store.pending_count().await, 1);
        assert_eq!(*dispatcher.state().borrow(), DispatcherState::Idle);
    }
}
