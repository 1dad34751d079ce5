//! Composite objects built from a template name and a field mapping.
//!
//! Some templates need their raw fields shaped before upload (honeypot logs
//! carry bookkeeping fields that are not part of the template). That shaping
//! lives in [`ObjectProfile`].

use serde::Serialize;
use serde_json::{Map, Value};

use super::records::scalar_to_string;

/// One attribute of an object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectAttribute {
    pub object_relation: String,
    pub value: String,

    /// Extra attribute properties (type, category, comment, ...)
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// A structured group of attributes instantiated from a named template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    pub name: String,
    pub attributes: Vec<ObjectAttribute>,
}

impl ObjectRecord {
    /// Build an object from the payload fields, applying the template's profile
    pub fn from_fields(name: impl Into<String>, fields: Map<String, Value>) -> Self {
        let name = name.into();
        let profile = ObjectProfile::for_template(&name);
        let mut attributes = Vec::new();

        for (relation, value) in fields {
            if profile.skips(&relation) {
                continue;
            }
            let value = profile.normalize(&relation, value);
            push_attributes(&mut attributes, relation, value);
        }

        Self { name, attributes }
    }

    /// Attribute value for a relation (first match)
    pub fn get(&self, relation: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.object_relation == relation)
            .map(|a| a.value.as_str())
    }
}

fn push_attributes(out: &mut Vec<ObjectAttribute>, relation: String, value: Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_attributes(out, relation.clone(), item);
            }
        }
        Value::Object(mut properties) => {
            let Some(value) = properties.remove("value").as_ref().and_then(scalar_to_string) else {
                return;
            };
            out.push(ObjectAttribute {
                object_relation: relation,
                value,
                properties,
            });
        }
        scalar => {
            if let Some(value) = scalar_to_string(&scalar) {
                out.push(ObjectAttribute {
                    object_relation: relation,
                    value,
                    properties: Map::new(),
                });
            }
        }
    }
}

/// Template-specific field shaping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectProfile {
    /// Relations dropped outright
    pub skip: &'static [&'static str],

    /// Relations dropped when their name contains one of these fragments
    pub skip_containing: &'static [&'static str],

    /// Relations whose ISO timestamps lose their trailing `Z`
    pub strip_utc_suffix: &'static [&'static str],
}

const COWRIE: ObjectProfile = ObjectProfile {
    skip: &["time", "duration", "isError", "ttylog"],
    skip_containing: &["log_"],
    strip_utc_suffix: &["timestamp"],
};

const PASSTHROUGH: ObjectProfile = ObjectProfile {
    skip: &[],
    skip_containing: &[],
    strip_utc_suffix: &[],
};

impl ObjectProfile {
    pub fn for_template(name: &str) -> Self {
        match name {
            "cowrie" => COWRIE,
            _ => PASSTHROUGH,
        }
    }

    pub fn skips(&self, relation: &str) -> bool {
        self.skip.contains(&relation)
            || self
                .skip_containing
                .iter()
                .any(|fragment| relation.contains(fragment))
    }

    fn normalize(&self, relation: &str, value: Value) -> Value {
        match value {
            Value::String(s) if self.strip_utc_suffix.contains(&relation) => {
                Value::String(s.trim_end_matches('Z').to_string())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cowrie_profile_shapes_fields() {
        let object = ObjectRecord::from_fields(
            "cowrie",
            fields(json!({
                "session": "a1b2",
                "username": "root",
                "timestamp": "2024-05-01T10:00:00.123Z",
                "time": 1714557600,
                "duration": 3.2,
                "log_level": "info",
                "ttylog": "x"
            })),
        );

        assert_eq!(object.get("session"), Some("a1b2"));
        assert_eq!(object.get("timestamp"), Some("2024-05-01T10:00:00.123"));
        assert_eq!(object.get("time"), None);
        assert_eq!(object.get("duration"), None);
        assert_eq!(object.get("log_level"), None);
        assert_eq!(object.get("ttylog"), None);
        assert_eq!(object.attributes.len(), 3);
    }

    #[test]
    fn test_unknown_template_passes_through() {
        let object = ObjectRecord::from_fields("file", fields(json!({"time": "now", "size": 10})));
        assert_eq!(object.get("time"), Some("now"));
        assert_eq!(object.get("size"), Some("10"));
    }

    #[test]
    fn test_mapping_value_keeps_properties() {
        let object = ObjectRecord::from_fields(
            "cowrie",
            fields(json!({"src_ip": {"value": "1.2.3.4", "type": "ip-src", "to_ids": true}})),
        );

        let attr = &object.attributes[0];
        assert_eq!(attr.value, "1.2.3.4");
        assert_eq!(attr.properties.get("type"), Some(&json!("ip-src")));
        assert_eq!(attr.properties.get("to_ids"), Some(&json!(true)));
    }

    #[test]
    fn test_array_value_expands() {
        let object = ObjectRecord::from_fields("cowrie", fields(json!({"username": ["a", "b"]})));
        assert_eq!(object.attributes.len(), 2);
        assert_eq!(object.attributes[1].value, "b");
    }
}
