//! The durable row shape and its state machine. Numeric encoding is fixed
//! for on-disk compatibility — never renumber these variants.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxState {
    NotPublished = 0,
    InProgress = 1,
    Published = 2,
    PublishedFailed = 3,
}

impl OutboxState {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for OutboxState {
    type Error = crate::error::OutboxError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutboxState::NotPublished),
            1 => Ok(OutboxState::InProgress),
            2 => Ok(OutboxState::Published),
            3 => Ok(OutboxState::PublishedFailed),
            other => Err(crate::error::OutboxError::UnknownStateCode(other)),
        }
    }
}

/// A row in `IntegrationEventLog`, the shape a caller reads back from
/// `retrievePending`/`retrieveFailed`. `event_type_short_name` is compared
/// against the event-bus registry to resolve a local type for
/// deserialization; a miss means `event` comes back as `None`.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub event_id: Uuid,
    pub event_type_name: String,
    pub state: OutboxState,
    pub times_sent: i32,
    pub creation_time: DateTime<Utc>,
    pub content: String,
    pub transaction_id: Uuid,
}

impl OutboxEntry {
    /// `EventTypeName`'s short form: the routing-key convention shared with
    /// the event-bus subscription registry.
    pub fn event_type_short_name(&self) -> &str {
        self.event_type_name
            .rsplit("::")
            .next()
            .unwrap_or(&self.event_type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The numeric encoding is fixed for on-disk compatibility; a future
    /// refactor reordering the variants would silently corrupt existing
    /// rows, so the mapping is pinned here.
    #[test]
    fn state_codes_match_the_on_disk_encoding() {
        assert_eq!(OutboxState::NotPublished.as_i32(), 0);
        assert_eq!(OutboxState::InProgress.as_i32(), 1);
        assert_eq!(OutboxState::Published.as_i32(), 2);
        assert_eq!(OutboxState::PublishedFailed.as_i32(), 3);
    }

    #[test]
    fn unrecognized_state_code_is_rejected() {
        let err = OutboxState::try_from(99).unwrap_err();
        assert!(matches!(err, crate::error::OutboxError::UnknownStateCode(99)));
    }

    #[test]
    fn event_type_short_name_strips_module_path() {
        let entry = OutboxEntry {
            event_id: Uuid::nil(),
            event_type_name: "my_app::events::OrderCreated".to_string(),
            state: OutboxState::NotPublished,
            times_sent: 0,
            creation_time: Utc::now(),
            content: "{}".to_string(),
            transaction_id: Uuid::nil(),
        };
        assert_eq!(entry.event_type_short_name(), "OrderCreated");
    }
}
