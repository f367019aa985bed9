//! The base shape every integration event carries: a stable identity plus a
//! UTC timestamp, wrapping whatever subtype fields the payload defines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Implemented by every concrete event payload. `event_type_name` is the
/// logical routing name: the broker routing key and the key into the
/// subscription registry. The default derives it from the Rust type's own
/// short name, which satisfies the "short type name" convention without any
/// runtime reflection.
pub trait EventPayload: Send + Sync + 'static {
    fn event_type_name() -> &'static str
    where
        Self: Sized,
    {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Envelope wrapping a payload with its identity and creation time.
///
/// `id` is stable across serialization round-trips: it is assigned once at
/// construction and carried verbatim through `serde`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationEvent<T> {
    pub id: Uuid,
    pub creation_date: DateTime<Utc>,
    pub payload: T,
}

impl<T> IntegrationEvent<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            creation_date: Utc::now(),
            payload,
        }
    }

    /// Construct with an explicit id, useful in tests that assert identity
    /// propagation end to end.
    pub fn with_id(id: Uuid, payload: T) -> Self {
        Self {
            id,
            creation_date: Utc::now(),
            payload,
        }
    }
}

impl<T: EventPayload> IntegrationEvent<T> {
    pub fn event_type_name(&self) -> &'static str {
        T::event_type_name()
    }
}
