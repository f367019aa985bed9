//! Mapping from logical event name to handler factories. Built once at
//! startup via the builder, then frozen into a cheap-to-clone, lock-free
//! reader.

use crate::envelope::{EventPayload, IntegrationEvent};
use crate::error::{BusError, BusResult};
use crate::serialization::{self, SerializerOptions};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// A handler for one concrete event type. Dispatch creates a fresh handler
/// per delivery via the registered factory — a scoped lifetime, matching
/// the "registry-of-constructors" design.
#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: IntegrationEvent<E>) -> BusResult<()>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle_json(&self, body: &[u8]) -> BusResult<()>;
}

struct TypedHandler<E, H> {
    handler: H,
    _marker: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: EventPayload + DeserializeOwned + Send + Sync + 'static,
    H: EventHandler<E> + Send + Sync,
{
    async fn handle_json(&self, body: &[u8]) -> BusResult<()> {
        let event: IntegrationEvent<E> = serialization::deserialize(body)?;
        self.handler.handle(event).await
    }
}

type HandlerFactory = Arc<dyn Fn() -> Box<dyn ErasedHandler> + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionRegistryBuilder {
    handler_factories: HashMap<&'static str, Vec<HandlerFactory>>,
    serializer_options: SerializerOptions,
}

impl SubscriptionRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler factory to the ordered list keyed by `E`'s event
    /// type name, and records the `eventTypeName -> eventType` mapping
    /// implicitly (the key itself resolves deserialization). Duplicate
    /// registration of the same factory is accepted: distinct handlers
    /// stack, and handlers run in registration order.
    pub fn register<E, H, F>(mut self, factory: F) -> Self
    where
        E: EventPayload + DeserializeOwned + Send + Sync + 'static,
        H: EventHandler<E> + Send + Sync + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let type_name = E::event_type_name();
        let wrapped: HandlerFactory = Arc::new(move || {
            Box::new(TypedHandler {
                handler: factory(),
                _marker: PhantomData,
            }) as Box<dyn ErasedHandler>
        });
        self.handler_factories.entry(type_name).or_default().push(wrapped);
        self
    }

    /// Applies `mutator` to the process-wide serializer options. Must be
    /// called during startup only — the built registry is immutable.
    pub fn configure_json_options(mut self, mutator: impl FnOnce(&mut SerializerOptions)) -> Self {
        mutator(&mut self.serializer_options);
        self
    }

    pub fn build(self) -> SubscriptionRegistry {
        SubscriptionRegistry(Arc::new(SubscriptionRegistryInner {
            handler_factories: self.handler_factories,
            serializer_options: self.serializer_options,
        }))
    }
}

struct SubscriptionRegistryInner {
    handler_factories: HashMap<&'static str, Vec<HandlerFactory>>,
    serializer_options: SerializerOptions,
}

/// Immutable, cheap-to-clone handle shared by the broker client and any
/// caller that needs to resolve a routing key to its registered handlers.
/// Readers never lock: all state is behind an `Arc` set up once at startup.
#[derive(Clone)]
pub struct SubscriptionRegistry(Arc<SubscriptionRegistryInner>);

impl SubscriptionRegistry {
    pub fn builder() -> SubscriptionRegistryBuilder {
        SubscriptionRegistryBuilder::new()
    }

    pub fn event_type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.handler_factories.keys().copied()
    }

    pub fn is_registered(&self, event_type_name: &str) -> bool {
        self.0.handler_factories.contains_key(event_type_name)
    }

    pub fn serializer_options(&self) -> &SerializerOptions {
        &self.0.serializer_options
    }

    /// Invokes every handler registered for `event_type_name`, in
    /// registration order, awaiting each before starting the next. The
    /// first handler error aborts the remaining handlers for this delivery
    /// — the chosen policy, not "run all and collect errors".
    pub(crate) async fn dispatch(&self, event_type_name: &str, body: &[u8]) -> BusResult<()> {
        let factories = self
            .0
            .handler_factories
            .get(event_type_name)
            .ok_or_else(|| BusError::UnknownEventType(event_type_name.to_string()))?;

        for factory in factories {
            let handler = factory();
            handler.handle_json(body).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct OrderCreated {
        order_id: u64,
    }
    impl EventPayload for OrderCreated {}

    #[derive(Debug, Serialize, Deserialize)]
    struct OrderShipped {
        order_id: u64,
    }
    impl EventPayload for OrderShipped {}

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler<OrderCreated> for CountingHandler {
        async fn handle(&self, _event: IntegrationEvent<OrderCreated>) -> BusResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler<OrderCreated> for FailingHandler {
        async fn handle(&self, _event: IntegrationEvent<OrderCreated>) -> BusResult<()> {
            Err(BusError::HandlerError("boom".into()))
        }
    }

    #[test]
    fn registry_uniqueness_across_distinct_event_types() {
        let registry = SubscriptionRegistry::builder()
            .register::<OrderCreated, _, _>(|| CountingHandler(Arc::new(AtomicUsize::new(0))))
            .register::<OrderShipped, _, _>(|| CountingHandler(Arc::new(AtomicUsize::new(0))))
            .build();

        assert!(registry.is_registered("OrderCreated"));
        assert!(registry.is_registered("OrderShipped"));
        assert!(!registry.is_registered("OrderCancelled"));
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order_and_both_are_invoked() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_a = counter.clone();
        let counter_b = counter.clone();

        let registry = SubscriptionRegistry::builder()
            .register::<OrderCreated, _, _>(move || CountingHandler(counter_a.clone()))
            .register::<OrderCreated, _, _>(move || CountingHandler(counter_b.clone()))
            .build();

        let event = IntegrationEvent::new(OrderCreated { order_id: 42 });
        let body = serde_json::to_vec(&event).unwrap();

        registry.dispatch("OrderCreated", &body).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_handler_error_aborts_remaining_handlers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let registry = SubscriptionRegistry::builder()
            .register::<OrderCreated, _, _>(|| FailingHandler)
            .register::<OrderCreated, _, _>(move || CountingHandler(counter_clone.clone()))
            .build();

        let event = IntegrationEvent::new(OrderCreated { order_id: 1 });
        let body = serde_json::to_vec(&event).unwrap();

        let result = registry.dispatch("OrderCreated", &body).await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_event_type_surfaces_as_unknown_event_type_error() {
        let registry = SubscriptionRegistry::builder().build();
        let err = registry.dispatch("Nope", b"{}").await.unwrap_err();
        assert!(matches!(err, BusError::UnknownEventType(_)));
    }
}
