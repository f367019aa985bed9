//! JSON encode/decode of events by their registered runtime type.

use crate::error::{BusError, BusResult};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Process-wide serializer knobs, mutated only during startup via
/// `SubscriptionRegistryBuilder::configure_json_options`.
#[derive(Debug, Clone, Default)]
pub struct SerializerOptions {
    /// Indented JSON is what the outbox persists as `Content`.
    pub pretty: bool,
}

/// Encodes using the event's own runtime subtype, so subtype fields survive.
pub fn serialize<T: Serialize>(event: &T, options: &SerializerOptions) -> BusResult<Vec<u8>> {
    let bytes = if options.pretty {
        serde_json::to_vec_pretty(event)
    } else {
        serde_json::to_vec(event)
    }
    .map_err(|e| BusError::MalformedPayload(e.to_string()))?;
    Ok(bytes)
}

/// Decodes into the given type. Field names must match exactly; use
/// [`deserialize_case_insensitive`] for outbox content, which may have been
/// produced by a differently-cased writer.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> BusResult<T> {
    serde_json::from_slice(bytes).map_err(|e| BusError::MalformedPayload(e.to_string()))
}

/// Case-insensitive property matching, used when reading outbox `Content`.
/// `serde`'s derive matches field names exactly, so incoming keys are
/// lower-cased before re-parsing into the target struct.
pub fn deserialize_case_insensitive<T: DeserializeOwned>(bytes: &[u8]) -> BusResult<T> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| BusError::MalformedPayload(e.to_string()))?;
    let normalized = lower_case_keys(value);
    serde_json::from_value(normalized).map_err(|e| BusError::MalformedPayload(e.to_string()))
}

fn lower_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.to_lowercase(), lower_case_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(lower_case_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        order_id: u64,
    }

    #[test]
    fn malformed_json_is_reported_as_malformed_payload() {
        let err = deserialize::<Payload>(b"not json").unwrap_err();
        assert!(matches!(err, BusError::MalformedPayload(_)));
    }

    #[test]
    fn case_insensitive_read_matches_differently_cased_keys() {
        let body = br#"{"Order_Id": 7}"#;
        let decoded: Payload = deserialize_case_insensitive(body).unwrap();
        assert_eq!(decoded, Payload { order_id: 7 });
    }

    #[test]
    fn pretty_option_produces_indented_content() {
        let options = SerializerOptions { pretty: true };
        let bytes = serialize(&Payload { order_id: 1 }, &options).unwrap();
        assert!(bytes.iter().any(|&b| b == b'\n'));
    }
}
