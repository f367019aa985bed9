use thiserror::Error;

/// Error taxonomy for the bus. Surface names match the operational intent of
/// each failure, not the underlying transport's own error type.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("not connected")]
    NotConnected,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("handler error: {0}")]
    HandlerError(String),

    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

impl BusError {
    /// Only `BrokerUnreachable` is retried by the retry pipeline; every other
    /// kind propagates on first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::BrokerUnreachable(_))
    }
}

pub type BusResult<T> = Result<T, BusError>;
