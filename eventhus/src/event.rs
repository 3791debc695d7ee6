//! The event envelope and payload encoding.
//!
//! An [`Event`] is an immutable fact recorded against one aggregate. Its
//! domain payload travels as opaque JSON (`data`); the `event_type` tag tells
//! an [`EventRegister`](crate::event_register::EventRegister) which Rust type
//! to decode it back into.
//!
//! Payload types are enums using serde's internally tagged representation
//! (`#[serde(tag = "type")]`). The tag becomes the envelope's `event_type`
//! and the remaining fields become `data`:
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! #[serde(tag = "type")]
//! enum AccountEvent {
//!     AccountCreated { owner: String },
//!     DepositPerformed { amount: u64 },
//! }
//! // DepositPerformed { amount: 300 }  =>  event_type "DepositPerformed", data {"amount": 300}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{EventStoreError, RegistryError};
use crate::metadata::EventMetadata;
use crate::types::{AggregateId, AggregateType, EventId, EventType, Timestamp, Version};

/// Field holding the variant tag in an internally tagged payload.
pub const TYPE_FIELD: &str = "type";

/// A domain event payload type.
///
/// Implementors must serialize with `#[serde(tag = "type")]` and list every
/// tag they can produce, so an event register can bind them up front.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Every tag this payload type can carry.
    fn event_types() -> Vec<&'static str>;
}

/// A recorded event.
///
/// Immutable once created. Owned by the repository until the store accepts
/// it, and by the store afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier of this event
    pub id: EventId,
    /// The aggregate this event belongs to
    pub aggregate_id: AggregateId,
    /// The kind of that aggregate
    pub aggregate_type: AggregateType,
    /// Payload tag used to decode `data`
    pub event_type: EventType,
    /// 1-based position in the aggregate's history
    pub version: Version,
    /// The serialized payload, minus its tag
    pub data: Value,
    /// Correlation, causation and free-form metadata
    pub metadata: EventMetadata,
    /// When the event was created, microsecond precision
    pub timestamp: Timestamp,
}

impl Event {
    /// Creates an event with a fresh id and the current time.
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: AggregateType,
        event_type: EventType,
        version: Version,
        data: Value,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            id: EventId::new(),
            aggregate_id,
            aggregate_type,
            event_type,
            version,
            data,
            metadata,
            timestamp: Timestamp::now(),
        }
    }

    /// Encodes a typed payload into a new event.
    pub fn from_payload<E: DomainEvent>(
        aggregate_id: AggregateId,
        aggregate_type: AggregateType,
        version: Version,
        payload: &E,
        metadata: EventMetadata,
    ) -> Result<Self, EventStoreError> {
        let (event_type, data) = encode_payload(payload)?;
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            event_type,
            version,
            data,
            metadata,
        ))
    }
}

/// Splits a payload into its tag and its remaining fields.
pub fn encode_payload<E: DomainEvent>(payload: &E) -> Result<(EventType, Value), EventStoreError> {
    let value = serde_json::to_value(payload)
        .map_err(|error| EventStoreError::SerializationFailed(error.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(EventStoreError::SerializationFailed(format!(
            "{} must serialize as an internally tagged object",
            std::any::type_name::<E>()
        )));
    };

    let tag = match fields.remove(TYPE_FIELD) {
        Some(Value::String(tag)) => tag,
        _ => {
            return Err(EventStoreError::SerializationFailed(format!(
                "{} is missing its `{TYPE_FIELD}` tag",
                std::any::type_name::<E>()
            )))
        }
    };

    let event_type = EventType::try_new(tag)
        .map_err(|error| EventStoreError::SerializationFailed(error.to_string()))?;

    let data = if fields.is_empty() {
        Value::Null
    } else {
        Value::Object(fields)
    };

    Ok((event_type, data))
}

/// Reassembles a payload from its tag and data.
pub fn decode_payload<E: DomainEvent>(event_type: &EventType, data: &Value) -> Result<E, RegistryError> {
    let mut fields = match data {
        Value::Null => Map::new(),
        Value::Object(fields) => fields.clone(),
        other => {
            return Err(RegistryError::Decode {
                event_type: event_type.to_string(),
                detail: format!("expected an object or null, found {other}"),
            })
        }
    };
    fields.insert(TYPE_FIELD.to_string(), Value::String(event_type.to_string()));

    serde_json::from_value(Value::Object(fields)).map_err(|error| RegistryError::Decode {
        event_type: event_type.to_string(),
        detail: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum LampEvent {
        Installed { room: String, watts: u32 },
        SwitchedOn,
        Dimmed { level: u8 },
    }

    impl DomainEvent for LampEvent {
        fn event_types() -> Vec<&'static str> {
            vec!["Installed", "SwitchedOn", "Dimmed"]
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Untagged {
        level: u8,
    }

    impl DomainEvent for Untagged {
        fn event_types() -> Vec<&'static str> {
            vec![]
        }
    }

    #[test]
    fn encode_splits_tag_from_fields() {
        let (event_type, data) = encode_payload(&LampEvent::Installed {
            room: "hall".into(),
            watts: 60,
        })
        .unwrap();

        assert_eq!(event_type.as_ref(), "Installed");
        assert_eq!(data, json!({"room": "hall", "watts": 60}));
    }

    #[test]
    fn unit_variants_carry_null_data() {
        let (event_type, data) = encode_payload(&LampEvent::SwitchedOn).unwrap();
        assert_eq!(event_type.as_ref(), "SwitchedOn");
        assert_eq!(data, Value::Null);

        let decoded: LampEvent = decode_payload(&event_type, &data).unwrap();
        assert_eq!(decoded, LampEvent::SwitchedOn);
    }

    #[test]
    fn decode_restores_the_payload() {
        let event_type = EventType::try_new("Dimmed").unwrap();
        let decoded: LampEvent = decode_payload(&event_type, &json!({"level": 40})).unwrap();
        assert_eq!(decoded, LampEvent::Dimmed { level: 40 });
    }

    #[test]
    fn decode_rejects_data_of_the_wrong_shape() {
        let event_type = EventType::try_new("Dimmed").unwrap();

        let scalar = decode_payload::<LampEvent>(&event_type, &json!(40));
        assert!(matches!(scalar, Err(RegistryError::Decode { .. })));

        let missing_field = decode_payload::<LampEvent>(&event_type, &json!({"lvl": 40}));
        assert!(matches!(missing_field, Err(RegistryError::Decode { .. })));
    }

    #[test]
    fn encode_rejects_payloads_without_a_tag() {
        let result = encode_payload(&Untagged { level: 1 });
        assert!(matches!(result, Err(EventStoreError::SerializationFailed(_))));
    }

    #[test]
    fn from_payload_fills_the_envelope() {
        let aggregate_id = AggregateId::new();
        let metadata = EventMetadata::new().with_custom("source", "test");
        let event = Event::from_payload(
            aggregate_id,
            AggregateType::try_new("lamp").unwrap(),
            Version::new(1),
            &LampEvent::Dimmed { level: 10 },
            metadata.clone(),
        )
        .unwrap();

        assert_eq!(event.aggregate_id, aggregate_id);
        assert_eq!(event.aggregate_type.as_ref(), "lamp");
        assert_eq!(event.event_type.as_ref(), "Dimmed");
        assert_eq!(event.version, Version::new(1));
        assert_eq!(event.data, json!({"level": 10}));
        assert_eq!(event.metadata, metadata);
    }

    #[test]
    fn envelope_roundtrips_through_json() {
        let event = Event::from_payload(
            AggregateId::new(),
            AggregateType::try_new("lamp").unwrap(),
            Version::new(7),
            &LampEvent::SwitchedOn,
            EventMetadata::new(),
        )
        .unwrap();

        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
