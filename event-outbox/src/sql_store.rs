//! Direct-SQL backing: hand-written query text via `sqlx::query`/`query_as`,
//! grounded on the teacher's `modules/ar/src/events/outbox.rs` and
//! `modules/gl/src/repos/outbox_repo.rs`, which enqueue/fetch outbox rows the
//! same way against the same `sqlx::PgPool`/`Transaction` primitives.

use crate::error::OutboxResult;
use crate::model::{OutboxEntry, OutboxState};
use crate::store::OutboxStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
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

const SELECT_COLUMNS: &str = r#"
    EventId AS event_id, EventTypeName AS event_type_name, State AS state,
    TimesSent AS times_sent, CreationTime AS creation_time, Content AS content,
    TransactionId AS transaction_id
"#;

/// Updates state with the single-statement form from the outbox contract:
/// `TimesSent` only advances on the transition into `InProgress`, never on
/// `Published`/`PublishedFailed`.
async fn set_state(pool: &PgPool, event_id: Uuid, state: OutboxState) -> OutboxResult<()> {
    sqlx::query(
        r#"
        UPDATE IntegrationEventLog
        SET State = $1,
            TimesSent = CASE WHEN $1 = 1 THEN TimesSent + 1 ELSE TimesSent END
        WHERE EventId = $2
        "#,
    )
    .bind(state.as_i32())
    .bind(event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Direct-SQL backing for the outbox contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlOutboxStore;

impl SqlOutboxStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutboxStore for SqlOutboxStore {
    async fn save_event(
        &self,
        pool: &PgPool,
        event_id: Uuid,
        event_type_name: &str,
        content: &str,
    ) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO IntegrationEventLog
                (EventId, EventTypeName, State, TimesSent, CreationTime, Content, TransactionId)
            VALUES ($1, $2, $3, 0, NOW(), $4, $5)
            "#,
        )
        .bind(event_id)
        .bind(event_type_name)
        .bind(OutboxState::NotPublished.as_i32())
        .bind(content)
        .bind(Uuid::nil())
        .execute(pool)
        .await?;
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
        sqlx::query(
            r#"
            INSERT INTO IntegrationEventLog
                (EventId, EventTypeName, State, TimesSent, CreationTime, Content, TransactionId)
            VALUES ($1, $2, $3, 0, NOW(), $4, $5)
            "#,
        )
        .bind(event_id)
        .bind(event_type_name)
        .bind(OutboxState::NotPublished.as_i32())
        .bind(content)
        .bind(transaction_id)
        .execute(&mut **tx)
        .await?;
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
        let rows: Vec<OutboxRow> = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM IntegrationEventLog WHERE State = $1 ORDER BY CreationTime ASC"
        ))
        .bind(OutboxState::NotPublished.as_i32())
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn retrieve_pending_by_transaction(
        &self,
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> OutboxResult<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM IntegrationEventLog WHERE State = $1 AND TransactionId = $2 ORDER BY CreationTime ASC"
        ))
        .bind(OutboxState::NotPublished.as_i32())
        .bind(transaction_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn retrieve_failed(&self, pool: &PgPool) -> OutboxResult<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM IntegrationEventLog WHERE State = $1 ORDER BY CreationTime ASC"
        ))
        .bind(OutboxState::PublishedFailed.as_i32())
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn retrieve_failed_by_transaction(
        &self,
        pool: &PgPool,
        transaction_id: Uuid,
    ) -> OutboxResult<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as::<_, OutboxRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM IntegrationEventLog WHERE State = $1 AND TransactionId = $2 ORDER BY CreationTime ASC"
        ))
        .bind(OutboxState::PublishedFailed.as_i32())
        .bind(transaction_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter().map(OutboxEntry::try_from).collect()
    }
}
