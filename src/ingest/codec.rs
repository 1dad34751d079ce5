//! Queue payload codec.
//!
//! Payloads are JSON objects. The lane a payload was popped from decides how
//! it is decoded; producers use the `encode_*` functions so both sides agree
//! on the format.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::records::{opt_epoch_seconds, opt_scalar_string};
use crate::domain::{
    AttributeRecord, ErrorRecord, EventId, ItemKind, ObjectRecord, SightingRecord, SightingType,
};

/// Field carrying an explicit target event inside attribute/object payloads
pub const EVENT_ID_FIELD: &str = "event_id";

/// Field naming the object template inside object payloads
pub const OBJECT_NAME_FIELD: &str = "name";

/// Errors that can occur while decoding a payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("{kind} payload is missing required field '{field}'")]
    MissingField { kind: ItemKind, field: &'static str },

    #[error("invalid {kind} payload: {source}")]
    InvalidShape {
        kind: ItemKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("sighting payload needs one of 'value', 'uuid' or 'id'")]
    MissingAnchor,

    #[error("invalid sighting uuid '{0}'")]
    InvalidUuid(String),
}

/// A decoded queue item
#[derive(Debug, Clone, PartialEq)]
pub enum QueueRecord {
    Attribute {
        record: AttributeRecord,
        event_id: Option<EventId>,
    },
    Object {
        record: ObjectRecord,
        event_id: Option<EventId>,
    },
    Sighting(SightingRecord),
}

impl QueueRecord {
    pub fn kind(&self) -> ItemKind {
        match self {
            QueueRecord::Attribute { .. } => ItemKind::Attribute,
            QueueRecord::Object { .. } => ItemKind::Object,
            QueueRecord::Sighting(_) => ItemKind::Sighting,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SightingWire {
    #[serde(
        default,
        alias = "values",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many",
        serialize_with = "serialize_one_or_many"
    )]
    value: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_scalar_string"
    )]
    id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,

    #[serde(default, rename = "type")]
    sighting_type: SightingType,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_epoch_seconds"
    )]
    timestamp: Option<i64>,
}

/// Decode a raw payload popped from a lane of the given kind
pub fn decode(kind: ItemKind, raw: &str) -> Result<QueueRecord, DecodeError> {
    let mut fields = parse_object(raw)?;

    match kind {
        ItemKind::Attribute => {
            let event_id = take_event_id(kind, &mut fields)?;
            if !fields.contains_key("type") && !fields.contains_key("attribute_type") {
                return Err(DecodeError::MissingField { kind, field: "type" });
            }
            if !fields.contains_key("value") {
                return Err(DecodeError::MissingField { kind, field: "value" });
            }
            let record = serde_json::from_value(Value::Object(fields))
                .map_err(|source| DecodeError::InvalidShape { kind, source })?;
            Ok(QueueRecord::Attribute { record, event_id })
        }
        ItemKind::Object => {
            let name = match fields.remove(OBJECT_NAME_FIELD) {
                Some(Value::String(name)) if !name.is_empty() => name,
                _ => {
                    return Err(DecodeError::MissingField {
                        kind,
                        field: OBJECT_NAME_FIELD,
                    })
                }
            };
            let event_id = take_event_id(kind, &mut fields)?;
            Ok(QueueRecord::Object {
                record: ObjectRecord::from_fields(name, fields),
                event_id,
            })
        }
        ItemKind::Sighting => {
            let wire: SightingWire = serde_json::from_value(Value::Object(fields))
                .map_err(|source| DecodeError::InvalidShape { kind, source })?;
            sighting_from_wire(wire).map(QueueRecord::Sighting)
        }
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_str::<Value>(raw).map_err(DecodeError::Malformed)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn take_event_id(
    kind: ItemKind,
    fields: &mut Map<String, Value>,
) -> Result<Option<EventId>, DecodeError> {
    match fields.remove(EVENT_ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| DecodeError::InvalidShape { kind, source }),
    }
}

fn sighting_from_wire(wire: SightingWire) -> Result<SightingRecord, DecodeError> {
    let uuid = wire
        .uuid
        .map(|raw| Uuid::parse_str(&raw).map_err(|_| DecodeError::InvalidUuid(raw)))
        .transpose()?;

    let record = SightingRecord {
        values: wire.value,
        uuid,
        id: wire.id,
        source: wire.source,
        sighting_type: wire.sighting_type,
        // Evaluated per payload: a missing timestamp means "seen now"
        timestamp: wire.timestamp.unwrap_or_else(|| Utc::now().timestamp()),
    };

    if !record.has_anchor() {
        return Err(DecodeError::MissingAnchor);
    }
    Ok(record)
}

/// Encode an attribute payload, optionally pinned to an event
pub fn encode_attribute(
    record: &AttributeRecord,
    event_id: Option<EventId>,
) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(record)?;
    if let (Some(id), Value::Object(fields)) = (event_id, &mut value) {
        fields.insert(EVENT_ID_FIELD.to_string(), serde_json::to_value(id)?);
    }
    serde_json::to_string(&value)
}

/// Encode an object payload: the template name plus its raw fields
pub fn encode_object(
    name: &str,
    fields: &Map<String, Value>,
    event_id: Option<EventId>,
) -> serde_json::Result<String> {
    let mut payload = fields.clone();
    payload.insert(OBJECT_NAME_FIELD.to_string(), Value::String(name.to_string()));
    if let Some(id) = event_id {
        payload.insert(EVENT_ID_FIELD.to_string(), serde_json::to_value(id)?);
    }
    serde_json::to_string(&payload)
}

/// Encode a sighting payload
pub fn encode_sighting(record: &SightingRecord) -> serde_json::Result<String> {
    let wire = SightingWire {
        value: record.values.clone(),
        uuid: record.uuid.map(|u| u.to_string()),
        id: record.id.clone(),
        source: record.source.clone(),
        sighting_type: record.sighting_type,
        timestamp: Some(record.timestamp),
    };
    serde_json::to_string(&wire)
}

pub fn encode_error(record: &ErrorRecord) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

pub fn decode_error(raw: &str) -> Result<ErrorRecord, DecodeError> {
    serde_json::from_str(raw).map_err(DecodeError::Malformed)
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        scalar => vec![scalar],
    };
    items
        .iter()
        .map(|item| {
            crate::domain::records::scalar_to_string(item).ok_or_else(|| {
                serde::de::Error::custom(format!("expected a scalar sighting value, got {}", item))
            })
        })
        .collect()
}

fn serialize_one_or_many<S: Serializer>(values: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    match values {
        [single] => serializer.serialize_str(single),
        many => many.serialize(serializer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_attribute_with_embedded_event() {
        let record = decode(
            ItemKind::Attribute,
            r#"{"type": "ip-src", "value": "8.8.8.8", "category": "Network activity", "event_id": "12"}"#,
        )
        .unwrap();

        match record {
            QueueRecord::Attribute { record, event_id } => {
                assert_eq!(record.attribute_type, "ip-src");
                assert_eq!(record.category.as_deref(), Some("Network activity"));
                assert_eq!(event_id, Some(EventId(12)));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_decode_attribute_missing_value() {
        let err = decode(ItemKind::Attribute, r#"{"type": "ip-src"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "value", .. }));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode(ItemKind::Sighting, "{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        let err = decode(ItemKind::Sighting, "[1, 2]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn test_decode_object_strips_routing_fields() {
        let record = decode(
            ItemKind::Object,
            r#"{"name": "cowrie", "event_id": 3, "session": "s1", "username": "admin"}"#,
        )
        .unwrap();

        match record {
            QueueRecord::Object { record, event_id } => {
                assert_eq!(record.name, "cowrie");
                assert_eq!(event_id, Some(EventId(3)));
                assert_eq!(record.get("name"), None);
                assert_eq!(record.get("event_id"), None);
                assert_eq!(record.get("username"), Some("admin"));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_decode_object_requires_name() {
        let err = decode(ItemKind::Object, r#"{"session": "s1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "name", .. }));
    }

    #[test]
    fn test_decode_sighting_defaults() {
        let before = Utc::now().timestamp();
        let record = decode(ItemKind::Sighting, r#"{"value": "8.8.8.8"}"#).unwrap();
        let QueueRecord::Sighting(sighting) = record else {
            panic!("expected a sighting");
        };
        assert_eq!(sighting.values, vec!["8.8.8.8".to_string()]);
        assert_eq!(sighting.sighting_type, SightingType::Normal);
        assert!(sighting.timestamp >= before);
    }

    #[test]
    fn test_decode_sighting_requires_anchor() {
        let err = decode(ItemKind::Sighting, r#"{"source": "honeypot", "type": 1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingAnchor));
    }

    #[test]
    fn test_decode_sighting_rejects_bad_type_and_uuid() {
        assert!(matches!(
            decode(ItemKind::Sighting, r#"{"value": "x", "type": 4}"#),
            Err(DecodeError::InvalidShape { .. })
        ));
        assert!(matches!(
            decode(ItemKind::Sighting, r#"{"uuid": "not-a-uuid"}"#),
            Err(DecodeError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_decode_sighting_float_timestamp_truncated() {
        let record = decode(
            ItemKind::Sighting,
            r#"{"value": "8.8.8.8", "type": 0, "timestamp": 1714557600.25}"#,
        )
        .unwrap();
        let QueueRecord::Sighting(sighting) = record else {
            panic!("expected a sighting");
        };
        assert_eq!(sighting.timestamp, 1_714_557_600);

        assert!(matches!(
            decode(ItemKind::Sighting, r#"{"value": "x", "timestamp": "yesterday"}"#),
            Err(DecodeError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_encode_sighting_single_value_as_string() {
        let record = SightingRecord::for_values(vec!["8.8.8.8".to_string()]).with_timestamp(100);
        let json: Value = serde_json::from_str(&encode_sighting(&record).unwrap()).unwrap();
        assert_eq!(json["value"], "8.8.8.8");
        assert_eq!(json["type"], 0);
        assert_eq!(json["timestamp"], 100);
    }

    #[test]
    fn test_encode_object_carries_name() {
        let fields = serde_json::json!({"session": "s1"}).as_object().cloned().unwrap();
        let payload = encode_object("cowrie", &fields, None).unwrap();
        let json: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["name"], "cowrie");
        assert!(json.get("event_id").is_none());
    }
}
