//! Real broker client over RabbitMQ/AMQP via `lapin`.
//!
//! Topology, retry, and tracing follow the numbered sequences in the
//! component design: one shared connection, one long-lived consumer
//! channel, a fresh channel per publish.

use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::registry::SubscriptionRegistry;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::trace;
use crate::{EventBus, EXCHANGE_NAME};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Owns one broker connection and, once started, one long-lived consumer
/// task. Publish opens and releases a fresh channel per call so concurrent
/// publishers never contend on the consumer's channel.
pub struct RabbitMqBus {
    connection: Arc<Connection>,
    config: BusConfig,
    consumer: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
}

impl RabbitMqBus {
    /// Obtains an open broker connection. Connection failure is reported as
    /// `BrokerUnreachable` rather than panicking the host's startup path.
    pub async fn connect(config: BusConfig) -> BusResult<Self> {
        let connection = Connection::connect(&config.amqp_uri(), ConnectionProperties::default())
            .await
            .map_err(|e| BusError::BrokerUnreachable(e.to_string()))?;

        Ok(Self {
            connection: Arc::new(connection),
            config,
            consumer: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
        })
    }

    async fn declare_exchange(channel: &Channel) -> BusResult<()> {
        channel
            .exchange_declare(
                EXCHANGE_NAME,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::BrokerUnreachable(e.to_string()))
    }

    async fn publish_once(&self, routing_key: &str, body: &[u8]) -> BusResult<()> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BusError::BrokerUnreachable(e.to_string()))?;

        let result = self.publish_on_channel(&channel, routing_key, body).await;
        // Released on exit of the publish regardless of outcome.
        let _ = channel.close(200, "ok").await;
        result
    }

    async fn publish_on_channel(
        &self,
        channel: &Channel,
        routing_key: &str,
        body: &[u8],
    ) -> BusResult<()> {
        Self::declare_exchange(channel).await?;

        let span = tracing::info_span!(
            "publish",
            otel.name = %format!("{routing_key} publish"),
            otel.kind = "client",
            messaging.system = "rabbitmq",
            messaging.destination_kind = "queue",
            messaging.operation = "publish",
            messaging.destination.name = %routing_key,
            messaging.rabbitmq.routing_key = %routing_key,
        );
        let _enter = span.enter();

        let mut headers = FieldTable::default();
        trace::inject_context(&span, &mut headers);

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_headers(headers);

        let publish_result: BusResult<()> = async {
            let confirm = channel
                .basic_publish(
                    EXCHANGE_NAME,
                    routing_key,
                    BasicPublishOptions {
                        mandatory: true,
                        ..Default::default()
                    },
                    body,
                    properties,
                )
                .await
                .map_err(|e| BusError::BrokerUnreachable(e.to_string()))?;

            confirm
                .await
                .map_err(|e| BusError::BrokerUnreachable(e.to_string()))?;

            Ok(())
        }
        .await;

        if let Err(e) = &publish_result {
            trace::record_exception(&span, "BrokerUnreachable", &e.to_string());
        }

        publish_result
    }

    async fn run_consumer(
        connection: Arc<Connection>,
        config: BusConfig,
        registry: SubscriptionRegistry,
        shutdown: Arc<Notify>,
    ) {
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "failed to open consumer channel, consumer not started");
                return;
            }
        };

        if let Err(e) = Self::declare_exchange(&channel).await {
            tracing::error!(error = %e, "failed to declare exchange, consumer not started");
            return;
        }

        let queue_name = config.subscription_client_name.clone();
        if let Err(e) = channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            tracing::error!(error = %e, "failed to declare consumer queue, consumer not started");
            return;
        }

        for routing_key in registry.event_type_names() {
            if let Err(e) = channel
                .queue_bind(
                    &queue_name,
                    EXCHANGE_NAME,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
            {
                tracing::error!(error = %e, routing_key, "failed to bind queue, consumer not started");
                return;
            }
        }

        let mut consumer = match channel
            .basic_consume(
                &queue_name,
                &config.subscription_client_name,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                tracing::error!(error = %e, "failed to start consumer");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    break;
                }
                delivery = consumer.next() => {
                    let Some(delivery) = delivery else { break };
                    match delivery {
                        Ok(delivery) => {
                            Self::handle_delivery(&registry, &delivery).await;
                            if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                                tracing::error!(error = %e, "failed to ack delivery");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "error receiving delivery");
                        }
                    }
                }
            }
        }
    }

    /// Dispatches one delivery. Always returns normally: every failure
    /// mode (malformed payload, unknown event type, handler error) is
    /// caught here and logged, never propagated, because the delivery is
    /// acked unconditionally by the caller.
    async fn handle_delivery(registry: &SubscriptionRegistry, delivery: &lapin::message::Delivery) {
        let ctx = trace::extract_context(&delivery.properties.headers().clone().unwrap_or_default());

        let routing_key = delivery.routing_key.as_str();
        let span = tracing::info_span!(
            "receive",
            otel.name = %format!("{routing_key} receive"),
            otel.kind = "client",
            messaging.system = "rabbitmq",
            messaging.destination_kind = "queue",
            messaging.operation = "receive",
            messaging.destination.name = %routing_key,
            messaging.rabbitmq.routing_key = %routing_key,
        );
        span.set_parent(ctx);
        let _enter = span.enter();

        let body = match std::str::from_utf8(&delivery.data) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "malformed payload, message still acked");
                return;
            }
        };

        if body.to_lowercase().contains("throw-fake-exception") {
            tracing::warn!(routing_key, "fault injection: synthesized consume failure");
            return;
        }

        if !registry.is_registered(routing_key) {
            tracing::warn!(routing_key, "unknown event type, message acked and dropped");
            return;
        }

        if let Err(e) = registry.dispatch(routing_key, &delivery.data).await {
            trace::record_exception(&span, "HandlerError", &e.to_string());
            tracing::warn!(routing_key, error = %e, "handler error, remaining handlers skipped, message still acked");
        }
    }
}

#[async_trait]
impl EventBus for RabbitMqBus {
    async fn publish_bytes(&self, routing_key: &str, body: Vec<u8>) -> BusResult<()> {
        if !self.connection.status().connected() {
            return Err(BusError::NotConnected);
        }

        let retry_config = RetryConfig {
            max_attempts: self.config.retry_count,
        };
        let context = format!("{routing_key} publish");

        retry_with_backoff(
            || self.publish_once(routing_key, &body),
            &retry_config,
            BusError::is_transient,
            &context,
        )
        .await
    }

    /// Spawns the consumer-setup worker and returns promptly regardless of
    /// whether the setup eventually succeeds — host start is non-blocking.
    async fn start(&self, registry: SubscriptionRegistry) -> BusResult<()> {
        if !self.connection.status().connected() {
            tracing::warn!("connection not open at start, consumer will not be started");
            return Ok(());
        }

        let connection = self.connection.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            Self::run_consumer(connection, config, registry, shutdown).await;
        });

        *self.consumer.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.consumer.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for RabbitMqBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RabbitMqBus({})", self.config.subscription_client_name)
    }
}
