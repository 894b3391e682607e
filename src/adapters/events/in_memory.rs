//! In-memory event bus implementation.
//!
//! In-process notification pipeline: the dispatcher publishes a decoded
//! event, the bus hands it to every typed handler subscribed to that event
//! type, one after another. Also records every published event so tests can
//! assert on delivery.

use async_trait::async_trait;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::foundation::{DomainError, DomainEvent, ErrorCode, EventId, TypedEvent};
use crate::ports::{EventHandler, EventPublisher, EventSubscriber};

/// Type-erased handler stored by the bus.
#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), DomainError>;
    fn name(&self) -> &'static str;
}

struct TypedHandler<E, H> {
    inner: Arc<H>,
    _event: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: TypedEvent,
    H: EventHandler<E> + 'static,
{
    async fn handle(&self, event: &dyn DomainEvent) -> Result<(), DomainError> {
        match event.downcast_ref::<E>() {
            Some(typed) => self.inner.handle(typed).await,
            None => Err(DomainError::new(
                ErrorCode::InternalError,
                format!(
                    "Handler {} expects {}, got {}",
                    self.inner.name(),
                    E::EVENT_TYPE,
                    event.event_type()
                ),
            )),
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// In-memory event bus.
///
/// Features:
/// - Sequential delivery in subscription order
/// - Event capture for assertions
/// - Every handler runs even if an earlier one failed; failures are
///   reported together as one `HandlerFailed` error
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// bus.subscribe::<OrderPlaced, _>(Arc::new(ReserveStock::new(inventory)));
///
/// bus.publish(Arc::new(OrderPlaced::new(order_id))).await?;
///
/// assert!(bus.has_event("order.placed.v1"));
/// ```
pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<&'static str, Vec<Arc<dyn ErasedHandler>>>>,
    published: RwLock<Vec<Arc<dyn DomainEvent>>>,
}

impl InMemoryEventBus {
    /// Creates a new empty event bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            published: RwLock::new(Vec::new()),
        }
    }

    /// Number of handlers subscribed to an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    // === Test Helpers ===

    /// Returns all published events in publish order.
    pub fn published_events(&self) -> Vec<Arc<dyn DomainEvent>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns ids of published events in publish order.
    pub fn published_ids(&self) -> Vec<EventId> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.event_id())
            .collect()
    }

    /// Returns events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<Arc<dyn DomainEvent>> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Clears all published events (for test isolation).
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns count of published events.
    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Checks if a specific event type was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.event_type() == event_type)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: Arc<dyn DomainEvent>) -> Result<(), DomainError> {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&event));

        // Clone handlers to release lock before await points
        let type_handlers: Vec<Arc<dyn ErasedHandler>> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers
                .get(event.event_type())
                .cloned()
                .unwrap_or_default()
        };

        let mut errors = Vec::new();
        for handler in type_handlers {
            if let Err(e) = handler.handle(event.as_ref()).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_id = %event.event_id(),
                    event_type = event.event_type(),
                    error = %e,
                    "Event handler failed"
                );
                errors.push(format!("{}: {}", handler.name(), e));
            }
        }

        if !errors.is_empty() {
            return Err(DomainError::new(
                ErrorCode::HandlerFailed,
                format!("Handler errors: {}", errors.join(", ")),
            )
            .with_detail("event_id", event.event_id().to_string()));
        }

        Ok(())
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe<E, H>(&self, handler: Arc<H>)
    where
        E: TypedEvent,
        H: EventHandler<E> + 'static,
    {
        let erased: Arc<dyn ErasedHandler> = Arc::new(TypedHandler::<E, H> {
            inner: handler,
            _event: PhantomData,
        });
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(E::EVENT_TYPE)
            .or_default()
            .push(erased);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::fixtures::{ItemCreated, ItemRenamed};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler<ItemCreated> for CountingHandler {
        async fn handle(&self, _: &ItemCreated) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler<ItemCreated> for FailingHandler {
        async fn handle(&self, _: &ItemCreated) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::InternalError, "Handler failed"))
        }

        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    #[tokio::test]
    async fn publish_stores_event() {
        let bus = InMemoryEventBus::new();

        bus.publish(Arc::new(ItemCreated::new(1))).await.unwrap();

        assert_eq!(bus.event_count(), 1);
        assert!(bus.has_event("item.created.v1"));
    }

    #[tokio::test]
    async fn events_of_type_filters_correctly() {
        let bus = InMemoryEventBus::new();

        bus.publish(Arc::new(ItemCreated::new(1))).await.unwrap();
        bus.publish(Arc::new(ItemRenamed::new(1, "a"))).await.unwrap();
        bus.publish(Arc::new(ItemCreated::new(2))).await.unwrap();

        assert_eq!(bus.events_of_type("item.created.v1").len(), 2);
        assert_eq!(bus.events_of_type("item.renamed.v1").len(), 1);
    }

    #[tokio::test]
    async fn handler_receives_typed_event() {
        let bus = InMemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        struct RecordingHandler(Arc<Mutex<Vec<u64>>>);

        #[async_trait]
        impl EventHandler<ItemCreated> for RecordingHandler {
            async fn handle(&self, event: &ItemCreated) -> Result<(), DomainError> {
                self.0.lock().unwrap().push(event.item_id);
                Ok(())
            }

            fn name(&self) -> &'static str {
                "RecordingHandler"
            }
        }

        bus.subscribe::<ItemCreated, _>(Arc::new(RecordingHandler(seen.clone())));
        bus.publish(Arc::new(ItemCreated::new(7))).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn multiple_handlers_all_invoked() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe::<ItemCreated, _>(Arc::new(CountingHandler(counter.clone())));
        bus.subscribe::<ItemCreated, _>(Arc::new(CountingHandler(counter.clone())));
        bus.subscribe::<ItemCreated, _>(Arc::new(CountingHandler(counter.clone())));

        bus.publish(Arc::new(ItemCreated::new(1))).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(bus.handler_count("item.created.v1"), 3);
    }

    #[tokio::test]
    async fn other_event_types_do_not_reach_handler() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe::<ItemCreated, _>(Arc::new(CountingHandler(counter.clone())));

        bus.publish(Arc::new(ItemRenamed::new(1, "x"))).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_error_is_propagated_after_all_handlers_ran() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe::<ItemCreated, _>(Arc::new(FailingHandler));
        bus.subscribe::<ItemCreated, _>(Arc::new(CountingHandler(counter.clone())));

        let result = bus.publish(Arc::new(ItemCreated::new(1))).await;

        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::HandlerFailed);
        assert!(err.message.contains("FailingHandler"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_removes_all_events() {
        let bus = InMemoryEventBus::new();

        bus.publish(Arc::new(ItemCreated::new(1))).await.unwrap();
        bus.publish(Arc::new(ItemCreated::new(2))).await.unwrap();
        assert_eq!(bus.event_count(), 2);

        bus.clear();

        assert_eq!(bus.event_count(), 0);
    }
}
