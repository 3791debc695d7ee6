//! Event register: resolves stored event tags back into payload types.
//!
//! The register is built once at start-up and shared (usually behind an
//! `Arc`) with every repository. Each tag is bound to exactly one payload
//! type; decoding a tag as any other type is refused, which catches two
//! aggregates accidentally sharing an event name.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use serde_json::Value;

use crate::errors::RegistryError;
use crate::event::{decode_payload, DomainEvent, Event};
use crate::types::EventType;

type DecodeFn<E> = fn(&EventType, &Value) -> Result<E, RegistryError>;

struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    // Holds a `DecodeFn<E>` for the registered `E`
    decoder: Box<dyn Any + Send + Sync>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("type_name", &self.type_name)
            .field("decoder", &"<function>")
            .finish()
    }
}

/// Mapping from event tag to payload type.
#[derive(Debug, Default)]
pub struct EventRegister {
    types: HashMap<EventType, Registration>,
}

impl EventRegister {
    /// Creates an empty register.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every tag of `E` to `E`.
    ///
    /// Registering the same type twice is harmless. If any tag already belongs
    /// to another type nothing is registered and `TypeConflict` is returned.
    pub fn set<E: DomainEvent>(&mut self) -> Result<&mut Self, RegistryError> {
        let type_id = TypeId::of::<E>();
        let mut pending = Vec::new();

        for tag in E::event_types() {
            let event_type =
                EventType::try_new(tag).map_err(|error| RegistryError::InvalidTypeName {
                    name: tag.to_string(),
                    detail: error.to_string(),
                })?;

            match self.types.get(&event_type) {
                Some(existing) if existing.type_id != type_id => {
                    return Err(RegistryError::TypeConflict {
                        event_type: event_type.into_inner(),
                        existing: existing.type_name,
                        attempted: type_name::<E>(),
                    });
                }
                Some(_) => {}
                None => pending.push(event_type),
            }
        }

        for event_type in pending {
            let decoder: DecodeFn<E> = decode_payload::<E>;
            tracing::debug!(event_type = %event_type, payload = type_name::<E>(), "registering event type");
            self.types.insert(
                event_type,
                Registration {
                    type_id,
                    type_name: type_name::<E>(),
                    decoder: Box::new(decoder),
                },
            );
        }

        Ok(self)
    }

    /// Whether a tag is bound.
    pub fn is_registered(&self, event_type: &EventType) -> bool {
        self.types.contains_key(event_type)
    }

    /// All bound tags, sorted.
    pub fn registered_types(&self) -> Vec<EventType> {
        let mut types: Vec<_> = self.types.keys().cloned().collect();
        types.sort();
        types
    }

    /// Decodes an event's payload as `E`.
    pub fn decode<E: DomainEvent>(&self, event: &Event) -> Result<E, RegistryError> {
        let registration =
            self.types
                .get(&event.event_type)
                .ok_or_else(|| RegistryError::UnknownEventType {
                    event_type: event.event_type.to_string(),
                })?;

        let decoder = registration
            .decoder
            .downcast_ref::<DecodeFn<E>>()
            .ok_or_else(|| RegistryError::TypeMismatch {
                event_type: event.event_type.to_string(),
                registered: registration.type_name,
                requested: type_name::<E>(),
            })?;

        decoder(&event.event_type, &event.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EventMetadata;
    use crate::types::{AggregateId, AggregateType, Version};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum DoorEvent {
        Opened,
        Locked { code: u16 },
    }

    impl DomainEvent for DoorEvent {
        fn event_types() -> Vec<&'static str> {
            vec!["Opened", "Locked"]
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum WindowEvent {
        Opened,
        Cracked,
    }

    impl DomainEvent for WindowEvent {
        fn event_types() -> Vec<&'static str> {
            vec!["Opened", "Cracked"]
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    enum GateEvent {
        Swung,
    }

    impl DomainEvent for GateEvent {
        fn event_types() -> Vec<&'static str> {
            vec!["Swung", "  "]
        }
    }

    fn stored(event_type: &str, data: Value) -> Event {
        Event::new(
            AggregateId::new(),
            AggregateType::try_new("door").unwrap(),
            EventType::try_new(event_type).unwrap(),
            Version::new(1),
            data,
            EventMetadata::new(),
        )
    }

    #[test]
    fn decodes_registered_payloads() {
        let mut register = EventRegister::new();
        register.set::<DoorEvent>().unwrap();

        let decoded: DoorEvent = register
            .decode(&stored("Locked", json!({"code": 1234})))
            .unwrap();
        assert_eq!(decoded, DoorEvent::Locked { code: 1234 });
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let register = EventRegister::new();
        let result = register.decode::<DoorEvent>(&stored("Opened", Value::Null));
        assert_eq!(
            result,
            Err(RegistryError::UnknownEventType {
                event_type: "Opened".to_string()
            })
        );
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let mut register = EventRegister::new();
        register.set::<DoorEvent>().unwrap();
        register.set::<DoorEvent>().unwrap();

        assert_eq!(register.registered_types().len(), 2);
    }

    #[test]
    fn conflicting_tags_register_nothing() {
        let mut register = EventRegister::new();
        register.set::<DoorEvent>().unwrap();

        let result = register.set::<WindowEvent>();
        assert!(matches!(
            result,
            Err(RegistryError::TypeConflict { ref event_type, .. }) if event_type == "Opened"
        ));
        assert!(!register.is_registered(&EventType::try_new("Cracked").unwrap()));
    }

    #[test]
    fn decoding_as_the_wrong_type_is_a_mismatch() {
        let mut register = EventRegister::new();
        register.set::<DoorEvent>().unwrap();

        let result = register.decode::<WindowEvent>(&stored("Opened", Value::Null));
        assert!(matches!(result, Err(RegistryError::TypeMismatch { .. })));
    }

    #[test]
    fn blank_tags_are_invalid_names() {
        let mut register = EventRegister::new();
        let result = register.set::<GateEvent>();
        assert!(matches!(result, Err(RegistryError::InvalidTypeName { .. })));
        assert!(register.registered_types().is_empty());
    }
}
