use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("unregistered event type: {0}")]
    UnknownEventType(String),

    #[error("failed to encode event content: {0}")]
    Serialization(String),

    #[error("unrecognized state code in IntegrationEventLog: {0}")]
    UnknownStateCode(i32),
}

/// The same SQLSTATEs treated as transient across the resilient
/// transaction helper: serialization failures and deadlocks, the two
/// Postgres errors a retry can plausibly resolve.
pub fn is_transient_postgres_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => matches!(
            db_err.code().as_deref(),
            Some("40001") | Some("40P01")
        ),
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        _ => false,
    }
}

impl OutboxError {
    /// Retry predicate consumed by [`crate::resilient_transaction::execute`]:
    /// only a persistence error whose SQLSTATE is itself transient is worth
    /// replaying the whole transaction for.
    pub fn is_transient(&self) -> bool {
        match self {
            OutboxError::Persistence(e) => is_transient_postgres_error(e),
            _ => false,
        }
    }
}

pub type OutboxResult<T> = Result<T, OutboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_persistence_errors_are_never_transient() {
        assert!(!OutboxError::UnknownEventType("X".into()).is_transient());
        assert!(!OutboxError::UnknownStateCode(9).is_transient());
    }
}
