//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;

use redis2misp::adapters::{EventStoreGateway, GatewayResponse};
use redis2misp::domain::{
    AttributeRecord, EventId, EventSummary, NewEvent, ObjectRecord, ObjectTemplate,
    SightingRecord,
};
use redis2misp::ingest::{QueueBackend, QueueError};

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

/// One call received by [`RecordingGateway`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateEvent(NewEvent),
    ListEvents(String),
    ListTemplates,
    AddAttribute(EventId, AttributeRecord),
    AddObject(EventId, String, ObjectRecord),
    RecordSighting(SightingRecord),
}

/// In-memory event store that records every call
pub struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    events: Mutex<Vec<EventSummary>>,
    templates: Mutex<Vec<ObjectTemplate>>,
    next_id: AtomicU64,
    rejected_values: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            templates: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(100),
            rejected_values: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn with_event(self, id: u64, info: &str) -> Self {
        self.events.lock().unwrap().push(EventSummary {
            id: EventId(id),
            org_id: Some("1".to_string()),
            info: info.to_string(),
        });
        self
    }

    pub fn with_template(self, id: &str, name: &str) -> Self {
        self.templates.lock().unwrap().push(ObjectTemplate {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Attribute or sighting values answered with an `errors` body
    pub fn rejecting(self, value: &str) -> Self {
        self.rejected_values
            .lock()
            .unwrap()
            .insert(value.to_string());
        self
    }

    /// Make list and create calls fail
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn list_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::ListEvents(_)))
    }

    pub fn create_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateEvent(_)))
    }

    pub fn attribute_targets(&self) -> Vec<(EventId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddAttribute(id, record) => Some((id, record.value)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn answer(&self, value: &str) -> GatewayResponse {
        if self.rejected_values.lock().unwrap().contains(value) {
            GatewayResponse::new(json!({"errors": {"value": ["rejected"]}}))
        } else {
            GatewayResponse::new(json!({"saved": true}))
        }
    }
}

#[async_trait]
impl EventStoreGateway for RecordingGateway {
    async fn create_event(&self, event: &NewEvent) -> Result<EventId> {
        self.record(Call::CreateEvent(event.clone()));
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        let id = EventId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.events.lock().unwrap().push(EventSummary {
            id,
            org_id: Some("1".to_string()),
            info: event.info.clone(),
        });
        Ok(id)
    }

    async fn list_events_by_title(&self, title_query: &str) -> Result<Vec<EventSummary>> {
        self.record(Call::ListEvents(title_query.to_string()));
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.info.contains(title_query))
            .cloned()
            .collect())
    }

    async fn list_object_templates(&self) -> Result<Vec<ObjectTemplate>> {
        self.record(Call::ListTemplates);
        Ok(self.templates.lock().unwrap().clone())
    }

    async fn add_attribute(
        &self,
        event_id: EventId,
        attribute: &AttributeRecord,
    ) -> Result<GatewayResponse> {
        self.record(Call::AddAttribute(event_id, attribute.clone()));
        Ok(self.answer(&attribute.value))
    }

    async fn add_object(
        &self,
        event_id: EventId,
        template_id: &str,
        object: &ObjectRecord,
    ) -> Result<GatewayResponse> {
        self.record(Call::AddObject(
            event_id,
            template_id.to_string(),
            object.clone(),
        ));
        Ok(GatewayResponse::new(json!({"Object": {"id": "1"}})))
    }

    async fn record_sighting(&self, sighting: &SightingRecord) -> Result<GatewayResponse> {
        self.record(Call::RecordSighting(sighting.clone()));
        let first = sighting.values.first().map(String::as_str).unwrap_or("");
        Ok(self.answer(first))
    }
}

/// Queue backend whose pops always fail
pub struct FailingQueue;

fn backend_down() -> QueueError {
    QueueError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "backend down",
    )))
}

#[async_trait]
impl QueueBackend for FailingQueue {
    async fn push(&self, _key: &str, _payload: &str) -> Result<(), QueueError> {
        Err(backend_down())
    }

    async fn pop(&self, _key: &str) -> Result<Option<String>, QueueError> {
        Err(backend_down())
    }

    async fn len(&self, _key: &str) -> Result<usize, QueueError> {
        Err(backend_down())
    }

    async fn peek(&self, _key: &str, _limit: usize) -> Result<Vec<String>, QueueError> {
        Err(backend_down())
    }
}
