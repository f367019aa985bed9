//! "Managed" backing: the same operations as [`crate::sql_store::SqlOutboxStore`]
//! but assembled through `sqlx::QueryBuilder` instead of raw SQL text,
//! closer in spirit to an ORM's query-construction layer while staying on
//! the one database crate the teacher's whole pack standardizes on — see
//! DESIGN.md for why a second database crate was not pulled in for this.
//!
//! Grounded on the same row shape as
//! `modules/subscriptions/src/outbox.rs`/`modules/ar/src/events/outbox.rs`,
//! which already fetch outbox rows through `sqlx::query_as::<_, T>` against a
//! `#[derive(FromRow)]` struct — the "typed, builder-assembled" style this
//! backing generalizes to the full outbox contract.

use crate::error::OutboxResult;
use crate::model::{OutboxEntry, OutboxState};
use crate::store::OutboxStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct OutboxRow {
    event_id: Uuid,
    event_type_name: String,
    state: i32,
    times_sent: i32,
    creation_time: DateTime<Utc>,
    content: String,
    transaction_id: Uuid,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = crate::error::OutboxError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEntry {
            event_id: row.event_id,
            event_type_name: row.event_type_name,
            state: OutboxState::try_from(row.state)?,
            times_sent: row.times_sent,
            creation_time: row.creation_time,
            content: row.content,
            transaction_id: row.transaction_id,
        })
    }
}

fn select_builder<'a>(state: OutboxState) -> QueryBuilder<'a, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT EventId AS event_id, EventTypeName AS event_type_name, State AS state, \
         TimesSent AS times_sent, CreationTime AS creation_time, Content AS content, \
         TransactionId AS transaction_id FROM IntegrationEventLog WHERE State = ",
    );
    builder.push_bind(state.as_i32());
    builder
}

/// The one parameterized state-update statement from the outbox contract,
/// assembled through the builder: `TimesSent` advances only on the
/// transition into `InProgress`.
async fn set_state(pool: &PgPool, event_id: Uuid, state: OutboxState) -> OutboxResult<()> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("UPDATE IntegrationEventLog SET State = ");
    builder.push_bind(state.as_i32());
    builder.push(", TimesSent = CASE WHEN ");
    builder.push_bind(state.as_i32());
    builder.push(" = ");
    builder.push_bind(OutboxState::InProgress.as_i32());
    builder.push(" THEN TimesSent + 1 ELSE TimesSent END WHERE EventId = ");
    builder.push_bind(event_id);

    builder.build().execute(pool).await?;
    Ok(())
}

/// `QueryBuilder`-assembled backing for the outbox contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagedOutboxStore;

impl ManagedOutboxStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutboxStore for ManagedOutboxStore {
    async fn save_event(
        &self,
        pool: &PgPool,
        event_id: Uuid,
        event_type_name: &str,
        content: &str,
    ) -> OutboxResult<()> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO IntegrationEventLog \
             (EventId, EventTypeName, State, TimesSent, CreationTime, Content, TransactionId) \
             VALUES (",
        );
        builder
            .push_bind(event_id)
            .push(", ")
            .push_bind(event_type_name)
            .push(", ")
            .push_bind(OutboxState::NotPublished.as_i32())
            .push(", 0, NOW(), ")
            .push_bind(content)
            .push(", ")
            .push_bind(Uuid::nil())
            .push(")");

        builder.build().execute(pool).await?;
        Ok(())
    }

    async fn save_event_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        event_type_name: &str,
        content: &str,
        transaction_id: Uuid,
    ) -> OutboxResult<()> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO IntegrationEventLog \
             (EventId, EventTypeName, State, TimesSent, CreationTime, Content, TransactionId) \
             VALUES (",
        );
        builder
            .push_bind(event_id)
            .push(", ")
            .push_bind(event_type_name)
            .push(", ")
            .push_bind(OutboxState::NotPublished.as_i32())
            .push(", 0, NOW(), ")
            .push_bind(content)
            .push(", ")
            .push_bind(transaction_id)
            .push(")");

        builder.build().execute(&mut **tx).await?;
        Ok(())
    }

    async fn mark_in_progress(&self, pool: &PgPool, event_id: Uuid) -> OutboxResult<()> {
        set_state(pool, event_id, OutboxState::InProgress).await
    }

    async fn mark_published(&self, pool: &PgPool, event_id: Uuid) -> OutboxResult<()> {
        set_state(pool, event_id, OutboxState::Published).await
    }

    async fn mark_failed(&self, pool: &PgPool, event_id: Uuid) -> OutboxResult<()> {
        set_state(pool, event_id, OutboxState::PublishedFailed).await
    }

    async fn retrieve_pending(&self, pool: &PgPool) -> OutboxResult<Vec<OutboxEntry>> {
        let mut builder = select_builder(OutboxState::NotPublished);
        builder.push(" ORDER BY CreationTime ASC");
        let rows: Vec<OutboxRow> = builder.build_query_as::<OutboxRow>().fetch_all(pool).await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn retrieve_pending_by_transaction(
        &self,
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> OutboxResult<Vec<OutboxEntry>> {
        let mut builder = select_builder(OutboxState::NotPublished);
        builder.push(" AND TransactionId = ");
        builder.push_bind(transaction_id);
        builder.push(" ORDER BY CreationTime ASC");
        let rows: Vec<OutboxRow> = builder.build_query_as::<OutboxRow>().fetch_all(pool).await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn retrieve_failed(&self, pool: &PgPool) -> OutboxResult<Vec<OutboxEntry>> {
        let mut builder = select_builder(OutboxState::PublishedFailed);
        builder.push(" ORDER BY CreationTime ASC");
        let rows: Vec<OutboxRow> = builder.build_query_as::<OutboxRow>().fetch_all(pool).await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn retrieve_failed_by_transaction(
        &self,
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> OutboxResult<Vec<OutboxEntry>> {
        let mut builder = select_builder(OutboxState::PublishedFailed);
        builder.push(" AND TransactionId = ");
        builder.push_bind(transaction_id);
        builder.push(" ORDER BY CreationTime ASC");
        let rows: Vec<OutboxRow> = builder.build_query_as::<OutboxRow>().fetch_all(pool).await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }
}
