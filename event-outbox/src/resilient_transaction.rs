//! Host-side helper that runs a batch of actions under one DB transaction,
//! retried at the whole-block granularity — the Rust realization of "the
//! ORM's built-in execution strategy." Reuses the same retry engine the
//! broker client uses (`event_bus::retry::retry_with_backoff`), filtered on
//! a Postgres-transient-error predicate instead of `BusError::is_transient`,
//! the "one retry engine, two call sites" design described in SPEC_FULL.md.
//!
//! Actions are erased behind [`TransactionAction`] the same way the
//! subscription registry erases handlers behind `ErasedHandler`: a thin
//! trait plus a blanket wrapper (`action`) so callers hand in closures
//! rather than naming a struct per action.

use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use event_bus::retry::{retry_with_backoff, RetryConfig};
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;

/// One unit of work run inside the shared transaction. Implementations
/// must be idempotent: the execution strategy may re-invoke the whole
/// action list from scratch on a transient failure.
#[async_trait]
pub trait TransactionAction: Send + Sync {
    async fn run(&self, tx: &mut Transaction<'_, Postgres>) -> OutboxResult<()>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> TransactionAction for FnAction<F>
where
    F: Fn(&mut Transaction<'_, Postgres>) -> Fut + Send + Sync,
    Fut: Future<Output = OutboxResult<()>> + Send,
{
    async fn run(&self, tx: &mut Transaction<'_, Postgres>) -> OutboxResult<()> {
        (self.0)(tx).await
    }
}

/// Wraps a closure as a [`TransactionAction`], so callers write
/// `action(|tx| async move { ... })` instead of defining a struct.
pub fn action<F, Fut>(f: F) -> Box<dyn TransactionAction>
where
    F: Fn(&mut Transaction<'_, Postgres>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OutboxResult<()>> + Send + 'static,
{
    Box::new(FnAction(f))
}

/// Runs `actions` in order inside one transaction: on any error, rolls back
/// and propagates; on success, commits. The whole begin-run-commit sequence
/// is retried by `retry_config` when the failure is a transient Postgres
/// error (serialization failure `40001`, deadlock `40P01`, or a
/// connection-level I/O error) — never for a caller error that isn't a
/// database concern.
pub async fn execute(
    pool: &PgPool,
    retry_config: &RetryConfig,
    actions: &[Box<dyn TransactionAction>],
) -> OutboxResult<()> {
    retry_with_backoff(
        || async {
            let mut tx = pool.begin().await.map_err(OutboxError::from)?;
            for action in actions {
                if let Err(e) = action.run(&mut tx).await {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
            tx.commit().await.map_err(OutboxError::from)?;
            Ok(())
        },
        retry_config,
        OutboxError::is_transient,
        "resilient_transaction",
    )
    .await
}
