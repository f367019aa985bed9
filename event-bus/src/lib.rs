//! # Integration Event Bus
//!
//! A publish/consume engine over a direct-exchange AMQP topology:
//! connection and channel lifecycle, exchange/queue/binding declaration,
//! retrying publish, type-keyed consumer dispatch, and W3C trace-context
//! propagation through message headers.
//!
//! ## Implementations
//!
//! - [`RabbitMqBus`] — production implementation over `lapin`.
//! - [`InMemoryEventBus`] — in-process test double, no network.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{BusConfig, EventBus, EventBusExt, EventPayload, IntegrationEvent, RabbitMqBus, SubscriptionRegistry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct OrderCreated { order_id: u64 }
//! impl EventPayload for OrderCreated {}
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BusConfig::from_env()?;
//! let bus = RabbitMqBus::connect(config).await?;
//!
//! let registry = SubscriptionRegistry::builder().build();
//! bus.start(registry).await?;
//!
//! let event = IntegrationEvent::new(OrderCreated { order_id: 42 });
//! bus.publish(&event, &Default::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
mod inmemory_bus;
mod rabbitmq_bus;
pub mod registry;
pub mod retry;
pub mod serialization;
pub mod trace;

pub use config::BusConfig;
pub use envelope::{EventPayload, IntegrationEvent};
pub use error::{BusError, BusResult};
pub use inmemory_bus::InMemoryEventBus;
pub use rabbitmq_bus::RabbitMqBus;
pub use registry::{EventHandler, SubscriptionRegistry, SubscriptionRegistryBuilder};
pub use serialization::SerializerOptions;

use async_trait::async_trait;

/// The one direct exchange every subscriber binds against.
pub const EXCHANGE_NAME: &str = "it-intern_event_bus";

/// Object-safe broker abstraction. Kept generic-free so it can live behind
/// `Arc<dyn EventBus>`; typed publish is layered on top via
/// [`EventBusExt`].
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an already-serialized body under `routing_key`.
    async fn publish_bytes(&self, routing_key: &str, body: Vec<u8>) -> BusResult<()>;

    /// Starts the consumer: declares topology, binds every event type in
    /// `registry`, and begins dispatching deliveries. Returns promptly
    /// regardless of whether the consumer actually started.
    async fn start(&self, registry: SubscriptionRegistry) -> BusResult<()>;

    /// Signals the consumer to stop and awaits a short drain window.
    async fn stop(&self);
}

/// Typed publish, layered over the object-safe [`EventBus`] core the same
/// way a blanket trait impl layers ergonomics over a narrower abstraction.
#[async_trait]
pub trait EventBusExt: EventBus {
    async fn publish<T>(
        &self,
        event: &IntegrationEvent<T>,
        options: &SerializerOptions,
    ) -> BusResult<()>
    where
        T: EventPayload + serde::Serialize + Send + Sync,
    {
        let routing_key = T::event_type_name();
        let body = serialization::serialize(event, options)?;
        self.publish_bytes(routing_key, body).await
    }
}

impl<B: EventBus + ?Sized> EventBusExt for B {}
