//! Remote event identifiers and event metadata.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of an event in the remote store.
///
/// MISP returns ids as numeric strings; both forms are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(EventId)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(EventId(n)),
            Raw::Text(s) => s
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid event id '{}'", s))),
        }
    }
}

/// One entry of an event index search
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventSummary {
    pub id: EventId,

    #[serde(default, deserialize_with = "crate::domain::records::opt_scalar_string")]
    pub org_id: Option<String>,

    /// Event title
    pub info: String,
}

/// An object template known to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectTemplate {
    #[serde(deserialize_with = "crate::domain::records::scalar_string")]
    pub id: String,
    pub name: String,
}

/// Classification applied to automatically created daily events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEventDefaults {
    /// Distribution level [0-3]
    #[serde(default)]
    pub distribution: u8,

    /// Threat level [1-4]
    #[serde(default = "default_threat_level")]
    pub threat_level: u8,

    /// Analysis state [0-2]
    #[serde(default)]
    pub analysis: u8,

    #[serde(default)]
    pub published: bool,
}

fn default_threat_level() -> u8 {
    3
}

impl Default for DailyEventDefaults {
    fn default() -> Self {
        Self {
            distribution: 0,
            threat_level: default_threat_level(),
            analysis: 0,
            published: false,
        }
    }
}

/// Parameters of a "create event" call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub distribution: u8,
    pub threat_level: u8,
    pub analysis: u8,
    pub info: String,
    pub date: Option<NaiveDate>,
    pub published: bool,
    pub orgc_id: Option<String>,
    pub org_id: Option<String>,
    pub sharing_group_id: Option<String>,
}

impl NewEvent {
    /// A daily event titled `info`, classified with `defaults`
    pub fn daily(info: String, date: NaiveDate, defaults: &DailyEventDefaults) -> Self {
        Self {
            distribution: defaults.distribution,
            threat_level: defaults.threat_level,
            analysis: defaults.analysis,
            info,
            date: Some(date),
            published: defaults.published,
            orgc_id: None,
            org_id: None,
            sharing_group_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_from_string_or_number() {
        let a: EventId = serde_json::from_str("\"42\"").unwrap();
        let b: EventId = serde_json::from_str("42").unwrap();
        assert_eq!(a, EventId(42));
        assert_eq!(a, b);
        assert!(serde_json::from_str::<EventId>("\"abc\"").is_err());
    }

    #[test]
    fn test_summary_accepts_numeric_org_id() {
        let summary: EventSummary =
            serde_json::from_str(r#"{"id": "7", "org_id": 1, "info": "hp 2024-01-01"}"#).unwrap();
        assert_eq!(summary.id, EventId(7));
        assert_eq!(summary.org_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_daily_defaults() {
        let defaults = DailyEventDefaults::default();
        assert_eq!(defaults.threat_level, 3);
        assert_eq!(defaults.distribution, 0);
        assert!(!defaults.published);
    }
}
