//! # Transactional Outbox Log
//!
//! Durable, state-machined record of every integration event an application
//! intends to publish, persisted in the same database transaction as the
//! business change that produced it. Two interchangeable backings satisfy
//! the same [`OutboxStore`] contract:
//!
//! - [`SqlOutboxStore`] — hand-written SQL text via `sqlx::query`/`query_as`.
//! - [`ManagedOutboxStore`] — the same operations assembled through
//!   `sqlx::QueryBuilder`.
//!
//! [`resilient_transaction::execute`] bundles a batch of actions into one
//! transaction retried at the whole-block granularity, the Rust realization
//! of an ORM's built-in execution strategy.

pub mod error;
pub mod managed_store;
pub mod model;
pub mod resilient_transaction;
pub mod sql_store;
pub mod store;

pub use error::{OutboxError, OutboxResult};
pub use managed_store::ManagedOutboxStore;
pub use model::{OutboxEntry, OutboxState};
pub use sql_store::SqlOutboxStore;
pub use store::{prepare_insert, OutboxStore};
