//! Typed records pushed to the remote store.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single typed observation attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    #[serde(rename = "type", alias = "attribute_type")]
    pub attribute_type: String,

    #[serde(deserialize_with = "scalar_string")]
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default)]
    pub to_ids: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<u8>,

    /// Submit as a proposal instead of a direct attribute
    #[serde(default)]
    pub proposal: bool,
}

impl AttributeRecord {
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_type: attribute_type.into(),
            value: value.into(),
            category: None,
            to_ids: false,
            comment: None,
            distribution: None,
            proposal: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Sighting type: 0 = normal sighting, 1 = false positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SightingType {
    #[default]
    Normal,
    FalsePositive,
}

impl TryFrom<u8> for SightingType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SightingType::Normal),
            1 => Ok(SightingType::FalsePositive),
            other => Err(format!(
                "invalid sighting type {} (expected 0=normal, 1=false-positive)",
                other
            )),
        }
    }
}

impl From<SightingType> for u8 {
    fn from(value: SightingType) -> Self {
        match value {
            SightingType::Normal => 0,
            SightingType::FalsePositive => 1,
        }
    }
}

/// A timestamped observation that a known attribute was seen again.
///
/// At least one anchor (`values`, `uuid` or `id`) is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightingRecord {
    pub values: Vec<String>,
    pub uuid: Option<Uuid>,
    pub id: Option<String>,
    pub source: Option<String>,
    pub sighting_type: SightingType,

    /// Seconds since epoch
    pub timestamp: i64,
}

impl SightingRecord {
    /// Sighting on one or more attribute values, timestamped now
    pub fn for_values(values: Vec<String>) -> Self {
        Self {
            values,
            uuid: None,
            id: None,
            source: None,
            sighting_type: SightingType::Normal,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Sighting on an attribute uuid, timestamped now
    pub fn for_uuid(uuid: Uuid) -> Self {
        Self {
            uuid: Some(uuid),
            ..Self::for_values(Vec::new())
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_type(mut self, sighting_type: SightingType) -> Self {
        self.sighting_type = sighting_type;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn has_anchor(&self) -> bool {
        !self.values.is_empty() || self.uuid.is_some() || self.id.is_some()
    }
}

/// A failed dispatch as written to the error queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
    pub item: String,
}

impl ErrorRecord {
    pub fn new(error: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            item: item.into(),
        }
    }
}

/// Render a JSON scalar as a string
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deserialize a string, number or bool into a String
pub(crate) fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a scalar value, got {}", value)))
}

/// Like [`scalar_string`], with `null` mapped to `None`
pub(crate) fn opt_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    scalar_to_string(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a scalar value, got {}", value)))
}

/// Seconds since the epoch as an integer or a float, fractions truncated
pub(crate) fn opt_epoch_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {}", n))),
        _ => Err(serde::de::Error::custom(format!(
            "expected a numeric timestamp, got {}",
            value
        ))),
    }
}
