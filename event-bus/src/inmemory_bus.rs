//! In-memory implementation of the bus for unit tests and local dev. There
//! is no network and no wildcard subscriptions: the topology is a single
//! direct exchange keyed by event name, so publish resolves the registered
//! handlers for that exact routing key in-process.

use crate::registry::SubscriptionRegistry;
use crate::{BusResult, EventBus};
use async_trait::async_trait;
use std::sync::{Mutex, RwLock};

/// Test-double broker. Grounded on the broadcast-channel test double shape,
/// but repurposed for exact-routing-key dispatch rather than wildcard
/// subject matching, since this bus has no fan-out topology to emulate.
#[derive(Default)]
pub struct InMemoryEventBus {
    registry: RwLock<Option<SubscriptionRegistry>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every routing key and body handed to `publish_bytes`, in order. Lets
    /// tests assert on what was published without a handler registered.
    pub fn published_messages(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_bytes(&self, routing_key: &str, body: Vec<u8>) -> BusResult<()> {
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), body.clone()));

        let registry = self.registry.read().unwrap().clone();
        let Some(registry) = registry else {
            // S3: publish before any subscriber registers. The broker
            // accepts the bytes regardless; fire-and-forget.
            return Ok(());
        };

        if let Ok(text) = std::str::from_utf8(&body) {
            if text.to_lowercase().contains("throw-fake-exception") {
                tracing::warn!(routing_key, "fault injection: synthesized consume failure");
                return Ok(());
            }
        }

        if !registry.is_registered(routing_key) {
            tracing::warn!(routing_key, "unknown event type, message acked and dropped");
            return Ok(());
        }

        if let Err(e) = registry.dispatch(routing_key, &body).await {
            tracing::warn!(routing_key, error = %e, "handler error, message still acked");
        }

        Ok(())
    }

    async fn start(&self, registry: SubscriptionRegistry) -> BusResult<()> {
        *self.registry.write().unwrap() = Some(registry);
        Ok(())
    }

    async fn stop(&self) {
        *self.registry.write().unwrap() = None;
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InMemoryEventBus")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EventPayload, IntegrationEvent};
    use crate::registry::EventHandler;
    use crate::EventBusExt;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct OrderCreated {
        order_id: u64,
    }
    impl EventPayload for OrderCreated {}

    struct RecordingHandler {
        seen_id: Arc<Mutex<Option<Uuid>>>,
        seen_order_id: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EventHandler<OrderCreated> for RecordingHandler {
        async fn handle(&self, event: IntegrationEvent<OrderCreated>) -> BusResult<()> {
            *self.seen_id.lock().unwrap() = Some(event.id);
            self.seen_order_id
                .store(event.payload.order_id == 42, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn s1_handler_invoked_once_with_matching_identity() {
        let seen_id = Arc::new(Mutex::new(None));
        let seen_order_id = Arc::new(AtomicBool::new(false));
        let seen_id_clone = seen_id.clone();
        let seen_order_id_clone = seen_order_id.clone();

        let registry = SubscriptionRegistry::builder()
            .register::<OrderCreated, _, _>(move || RecordingHandler {
                seen_id: seen_id_clone.clone(),
                seen_order_id: seen_order_id_clone.clone(),
            })
            .build();

        let bus = InMemoryEventBus::new();
        bus.start(registry).await.unwrap();

        let id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        let event = IntegrationEvent::with_id(id, OrderCreated { order_id: 42 });
        bus.publish(&event, &Default::default()).await.unwrap();

        assert_eq!(*seen_id.lock().unwrap(), Some(id));
        assert!(seen_order_id.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn s2_fault_injection_skips_handler_but_still_succeeds() {
        let seen_id = Arc::new(Mutex::new(None));
        let seen_order_id = Arc::new(AtomicBool::new(false));

        let registry = SubscriptionRegistry::builder()
            .register::<OrderCreated, _, _>({
                let seen_id = seen_id.clone();
                let seen_order_id = seen_order_id.clone();
                move || RecordingHandler {
                    seen_id: seen_id.clone(),
                    seen_order_id: seen_order_id.clone(),
                }
            })
            .build();

        let bus = InMemoryEventBus::new();
        bus.start(registry).await.unwrap();

        let body = br#"{"throw-fake-exception": true}"#.to_vec();
        let result = bus.publish_bytes("OrderCreated", body).await;

        assert!(result.is_ok());
        assert!(seen_id.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn s3_publish_before_any_subscriber_is_best_effort_success() {
        let bus = InMemoryEventBus::new();
        let result = bus.publish_bytes("NeverSubscribed", b"{}".to_vec()).await;
        assert!(result.is_ok());
        assert_eq!(bus.published_messages().len(), 1);
    }
}
