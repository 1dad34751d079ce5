//! MISP REST client.
//!
//! Auth: the API key is sent verbatim in the `Authorization` header.
//! Write calls never fail on an HTTP error status: the body (or a synthetic
//! `errors` body) is handed back so the caller can route it.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::{
    AttributeRecord, EventId, EventSummary, NewEvent, ObjectRecord, ObjectTemplate,
    SightingRecord,
};

use super::{EventStoreGateway, GatewayResponse};

/// Connection settings for a MISP instance
#[derive(Debug, Clone)]
pub struct MispSettings {
    pub url: String,
    pub key: String,
    pub verify_cert: bool,
    pub timeout: Duration,
}

/// MISP API client
pub struct MispClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl MispClient {
    pub fn new(settings: &MispSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_cert)
            .timeout(settings.timeout)
            .build()
            .context("Failed to build MISP HTTP client")?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.key.clone(),
            client,
        })
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.api_url(path))
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
    }

    /// Read-style call: any non-success status is an error
    async fn fetch(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach MISP at {}", path))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("MISP error ({}) on {}: {}", status, path, text.trim());
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse MISP response from {}", path))
    }

    /// Write-style call: the body is returned even on error statuses
    async fn submit(&self, path: &str, body: &Value) -> Result<GatewayResponse> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach MISP at {}", path))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Ok(GatewayResponse::new(write_response_body(
            status.as_u16(),
            status.is_success(),
            &text,
        )))
    }
}

/// Normalize a write-call answer so failures always carry `errors`
pub fn write_response_body(status: u16, success: bool, text: &str) -> Value {
    let parsed: Option<Value> = serde_json::from_str(text).ok();
    match parsed {
        Some(body) if success || body.get("errors").is_some() => body,
        Some(body) => json!({ "errors": { "status": status, "body": body } }),
        None if success => Value::Null,
        None => json!({ "errors": { "status": status, "body": text } }),
    }
}

/// Parse the event index, bare or wrapped in `response`, entries flat or under `Event`
pub fn parse_event_index(body: Value) -> Result<Vec<EventSummary>> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("response") {
            Some(Value::Array(entries)) => entries,
            _ => anyhow::bail!("Malformed event index: missing 'response' list"),
        },
        other => anyhow::bail!("Malformed event index: {}", other),
    };

    entries
        .into_iter()
        .map(|entry| {
            let entry = unwrap_envelope(entry, "Event");
            serde_json::from_value(entry).context("Malformed event index entry")
        })
        .collect()
}

/// Extract the new id from an "add event" answer
pub fn parse_created_event(body: &Value) -> Result<EventId> {
    if let Some(errors) = body.get("errors") {
        anyhow::bail!("MISP refused to create event: {}", errors);
    }
    let id = body
        .get("Event")
        .and_then(|event| event.get("id"))
        .cloned()
        .context("Malformed create-event response: missing Event.id")?;
    serde_json::from_value(id).context("Malformed create-event response: bad Event.id")
}

pub fn parse_object_templates(body: Value) -> Result<Vec<ObjectTemplate>> {
    let Value::Array(entries) = body else {
        anyhow::bail!("Malformed object template list");
    };
    entries
        .into_iter()
        .map(|entry| {
            let entry = unwrap_envelope(entry, "ObjectTemplate");
            serde_json::from_value(entry).context("Malformed object template entry")
        })
        .collect()
}

fn unwrap_envelope(entry: Value, envelope: &str) -> Value {
    match entry {
        Value::Object(mut map) if map.contains_key(envelope) => {
            map.remove(envelope).unwrap_or(Value::Null)
        }
        other => other,
    }
}

pub fn event_body(event: &NewEvent) -> Value {
    let mut fields = Map::new();
    fields.insert("distribution".into(), json!(event.distribution));
    fields.insert("threat_level_id".into(), json!(event.threat_level));
    fields.insert("analysis".into(), json!(event.analysis));
    fields.insert("info".into(), json!(event.info));
    fields.insert("published".into(), json!(event.published));
    if let Some(date) = event.date {
        fields.insert("date".into(), json!(date.format("%Y-%m-%d").to_string()));
    }
    for (name, value) in [
        ("orgc_id", &event.orgc_id),
        ("org_id", &event.org_id),
        ("sharing_group_id", &event.sharing_group_id),
    ] {
        if let Some(value) = value {
            fields.insert(name.into(), json!(value));
        }
    }
    json!({ "Event": fields })
}

pub fn attribute_body(attribute: &AttributeRecord) -> Value {
    let mut body = json!({
        "type": attribute.attribute_type,
        "value": attribute.value,
        "to_ids": attribute.to_ids,
    });
    if let Value::Object(fields) = &mut body {
        if let Some(category) = &attribute.category {
            fields.insert("category".into(), json!(category));
        }
        if let Some(comment) = &attribute.comment {
            fields.insert("comment".into(), json!(comment));
        }
        if let Some(distribution) = attribute.distribution {
            fields.insert("distribution".into(), json!(distribution));
        }
    }
    body
}

pub fn object_body(object: &ObjectRecord, template_id: &str) -> Value {
    json!({
        "Object": {
            "name": object.name,
            "template_id": template_id,
            "Attribute": object.attributes,
        }
    })
}

pub fn sighting_body(sighting: &SightingRecord) -> Value {
    let mut fields = Map::new();
    if !sighting.values.is_empty() {
        fields.insert("values".into(), json!(sighting.values));
    }
    if let Some(uuid) = sighting.uuid {
        fields.insert("uuid".into(), json!(uuid.to_string()));
    }
    if let Some(id) = &sighting.id {
        fields.insert("id".into(), json!(id));
    }
    if let Some(source) = &sighting.source {
        fields.insert("source".into(), json!(source));
    }
    fields.insert("type".into(), json!(u8::from(sighting.sighting_type)));
    fields.insert("timestamp".into(), json!(sighting.timestamp));
    Value::Object(fields)
}

#[async_trait]
impl EventStoreGateway for MispClient {
    async fn create_event(&self, event: &NewEvent) -> Result<EventId> {
        let body = self
            .fetch(reqwest::Method::POST, "events/add", Some(&event_body(event)))
            .await?;
        parse_created_event(&body)
    }

    async fn list_events_by_title(&self, title_query: &str) -> Result<Vec<EventSummary>> {
        let query = json!({ "eventinfo": title_query });
        let body = self
            .fetch(reqwest::Method::POST, "events/index", Some(&query))
            .await?;
        parse_event_index(body)
    }

    async fn list_object_templates(&self) -> Result<Vec<ObjectTemplate>> {
        let body = self
            .fetch(reqwest::Method::GET, "objectTemplates/index", None)
            .await?;
        parse_object_templates(body)
    }

    async fn add_attribute(
        &self,
        event_id: EventId,
        attribute: &AttributeRecord,
    ) -> Result<GatewayResponse> {
        let path = if attribute.proposal {
            format!("shadow_attributes/add/{}", event_id)
        } else {
            format!("attributes/add/{}", event_id)
        };
        self.submit(&path, &attribute_body(attribute)).await
    }

    async fn add_object(
        &self,
        event_id: EventId,
        template_id: &str,
        object: &ObjectRecord,
    ) -> Result<GatewayResponse> {
        let path = format!("objects/add/{}/{}", event_id, template_id);
        self.submit(&path, &object_body(object, template_id)).await
    }

    async fn record_sighting(&self, sighting: &SightingRecord) -> Result<GatewayResponse> {
        self.submit("sightings/add", &sighting_body(sighting)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::domain::{DailyEventDefaults, SightingType};

    fn settings() -> MispSettings {
        MispSettings {
            url: "https://misp.local/".to_string(),
            key: "KEY".to_string(),
            verify_cert: true,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_api_url() {
        let client = MispClient::new(&settings()).unwrap();
        assert_eq!(
            client.api_url("/events/index"),
            "https://misp.local/events/index"
        );
    }

    #[test]
    fn test_parse_event_index_shapes() {
        let wrapped = json!({"response": [{"Event": {"id": "3", "org_id": "1", "info": "hp 2024-05-01"}}]});
        let bare = json!([{"id": 4, "info": "hp 2024-05-02"}]);

        let a = parse_event_index(wrapped).unwrap();
        let b = parse_event_index(bare).unwrap();
        assert_eq!(a[0].id, EventId(3));
        assert_eq!(a[0].org_id.as_deref(), Some("1"));
        assert_eq!(b[0].id, EventId(4));
        assert!(b[0].org_id.is_none());
        assert!(parse_event_index(json!({"message": "nope"})).is_err());
    }

    #[test]
    fn test_parse_created_event() {
        assert_eq!(
            parse_created_event(&json!({"Event": {"id": "17"}})).unwrap(),
            EventId(17)
        );
        assert!(parse_created_event(&json!({"errors": "denied"})).is_err());
        assert!(parse_created_event(&json!({"Event": {}})).is_err());
    }

    #[test]
    fn test_parse_object_templates() {
        let templates = parse_object_templates(json!([
            {"ObjectTemplate": {"id": "9", "name": "cowrie"}},
            {"ObjectTemplate": {"id": 10, "name": "file"}}
        ]))
        .unwrap();
        assert_eq!(templates[0].id, "9");
        assert_eq!(templates[1].id, "10");
    }

    #[test]
    fn test_write_response_body_marks_failures() {
        let ok = write_response_body(200, true, r#"{"Attribute": {"id": "1"}}"#);
        assert!(ok.get("errors").is_none());

        let refused = write_response_body(403, false, r#"{"name": "Forbidden"}"#);
        assert_eq!(refused["errors"]["status"], 403);

        let html = write_response_body(502, false, "<html>bad gateway</html>");
        assert_eq!(html["errors"]["body"], "<html>bad gateway</html>");

        let reported = write_response_body(200, true, r#"{"errors": {"value": "duplicate"}}"#);
        assert_eq!(reported["errors"]["value"], "duplicate");
    }

    #[test]
    fn test_event_body() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let event = NewEvent::daily("hp 2024-05-01".to_string(), date, &DailyEventDefaults::default());
        let body = event_body(&event);
        assert_eq!(body["Event"]["info"], "hp 2024-05-01");
        assert_eq!(body["Event"]["threat_level_id"], 3);
        assert_eq!(body["Event"]["date"], "2024-05-01");
        assert!(body["Event"].get("org_id").is_none());
    }

    #[test]
    fn test_sighting_body() {
        let sighting = SightingRecord::for_values(vec!["8.8.8.8".to_string()])
            .with_type(SightingType::FalsePositive)
            .with_timestamp(1000);
        let body = sighting_body(&sighting);
        assert_eq!(body["values"], json!(["8.8.8.8"]));
        assert_eq!(body["type"], 1);
        assert_eq!(body["timestamp"], 1000);
        assert!(body.get("uuid").is_none());
    }

    #[test]
    fn test_object_body_lists_attributes() {
        let fields = json!({"session": "s1"}).as_object().cloned().unwrap();
        let object = ObjectRecord::from_fields("cowrie", fields);
        let body = object_body(&object, "9");
        assert_eq!(body["Object"]["template_id"], "9");
        assert_eq!(body["Object"]["Attribute"][0]["object_relation"], "session");
        assert_eq!(body["Object"]["Attribute"][0]["value"], "s1");
    }
}
