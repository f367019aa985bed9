//! The outbox contract: two backings (direct SQL and a `QueryBuilder`
//! managed style) both satisfy this trait, kept deliberately free of
//! generics over the event payload type so it stays object-safe and the
//! backings are truly interchangeable behind `&dyn OutboxStore`.

use crate::error::OutboxResult;
use crate::model::OutboxEntry;
use async_trait::async_trait;
use event_bus::{EventPayload, IntegrationEvent, SerializerOptions};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Inserts a row with `state=NotPublished`, `timesSent=0`,
    /// `transactionId=nil-UUID`.
    async fn save_event(&self, pool: &PgPool, event_id: Uuid, event_type_name: &str, content: &str) -> OutboxResult<()>;

    /// Same as [`save_event`](OutboxStore::save_event) but executed on the
    /// caller's transaction; `transactionId` is set from a caller-supplied
    /// identifier rather than generated here. Must not open its own
    /// transaction — co-commits with the caller's business change.
    async fn save_event_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        event_type_name: &str,
        content: &str,
        transaction_id: Uuid,
    ) -> OutboxResult<()>;

    /// Transitions to `InProgress` and atomically increments `timesSent`.
    async fn mark_in_progress(&self, pool: &PgPool, event_id: Uuid) -> OutboxResult<()>;

    /// Transitions to `Published`; `timesSent` unchanged.
    async fn mark_published(&self, pool: &PgPool, event_id: Uuid) -> OutboxResult<()>;

    /// Transitions to `PublishedFailed`; `timesSent` unchanged.
    async fn mark_failed(&self, pool: &PgPool, event_id: Uuid) -> OutboxResult<()>;

    /// Rows where `state = NotPublished`, ordered by `creationTime`
    /// ascending.
    async fn retrieve_pending(&self, pool: &PgPool) -> OutboxResult<Vec<OutboxEntry>>;

    /// As [`retrieve_pending`](OutboxStore::retrieve_pending), filtered by
    /// `transactionId`.
    async fn retrieve_pending_by_transaction(
        &self,
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> OutboxResult<Vec<OutboxEntry>>;

    /// Rows where `state = PublishedFailed`, ordered by `creationTime`
    /// ascending.
    async fn retrieve_failed(&self, pool: &PgPool) -> OutboxResult<Vec<OutboxEntry>>;

    /// As [`retrieve_failed`](OutboxStore::retrieve_failed), filtered by
    /// `transactionId`.
    async fn retrieve_failed_by_transaction(
        &self,
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> OutboxResult<Vec<OutboxEntry>>;
}

/// Encodes an event through the event-bus serializer so its `Content` is a
/// faithful JSON encoding of the runtime subtype, returning the
/// `(eventId, eventTypeName, content)` triple every backing's `save_event`
/// needs. Kept outside the trait so `OutboxStore` itself stays generic-free.
pub fn prepare_insert<T>(
    event: &IntegrationEvent<T>,
    options: &SerializerOptions,
) -> OutboxResult<(Uuid, &'static str, String)>
where
    T: EventPayload + Serialize,
{
    let bytes = event_bus::serialization::serialize(event, options)
        .map_err(|e| crate::error::OutboxError::Serialization(e.to_string()))?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    Ok((event.id, T::event_type_name(), content))
}
