//! Reference republisher: scans the outbox for publishable rows and drives
//! them through the broker client. Its *contract* is specified (§4.G);
//! its scheduling policy is explicitly not — this example ships as a
//! starting point for a host application's own worker loop, not as a
//! mandatory runtime the crates themselves start.
//!
//! Run against a live broker and Postgres:
//! `cargo run -p event-outbox --example republisher`

use event_bus::{BusConfig, EventBus, RabbitMqBus, SubscriptionRegistry};
use event_outbox::{OutboxStore, SqlOutboxStore};
use sqlx::PgPool;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bus_config = BusConfig::from_env()?;
    let bus = RabbitMqBus::connect(bus_config).await?;
    bus.start(SubscriptionRegistry::builder().build()).await?;

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPool::connect(&database_url).await?;

    let store = SqlOutboxStore::new();

    loop {
        republish_once(&store, &pool, &bus).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// One sweep: pending and previously-failed rows are both publishable
/// (§3 state machine), published rows are terminal, and a live `InProgress`
/// row is left alone — recovering an orphaned `InProgress` row left by a
/// process that died mid-publish is an operational sweep a host can layer
/// on top (see spec.md §9), not part of this contract.
async fn republish_once(store: &SqlOutboxStore, pool: &PgPool, bus: &impl EventBus) {
    let mut candidates = match store.retrieve_pending(pool).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "failed to retrieve pending outbox rows");
            return;
        }
    };
    match store.retrieve_failed(pool).await {
        Ok(rows) => candidates.extend(rows),
        Err(e) => tracing::error!(error = %e, "failed to retrieve failed outbox rows"),
    }

    for entry in candidates {
        if let Err(e) = store.mark_in_progress(pool, entry.event_id).await {
            tracing::error!(event_id = %entry.event_id, error = %e, "failed to mark in progress");
            continue;
        }

        let routing_key = entry.event_type_short_name().to_string();
        let publish_result = bus
            .publish_bytes(&routing_key, entry.content.clone().into_bytes())
            .await;

        match publish_result {
            Ok(()) => {
                if let Err(e) = store.mark_published(pool, entry.event_id).await {
                    tracing::error!(event_id = %entry.event_id, error = %e, "failed to mark published");
                }
            }
            Err(e) => {
                tracing::warn!(event_id = %entry.event_id, error = %e, "publish failed, marking failed for retry");
                if let Err(e) = store.mark_failed(pool, entry.event_id).await {
                    tracing::error!(event_id = %entry.event_id, error = %e, "failed to mark failed");
                }
            }
        }
    }
}
