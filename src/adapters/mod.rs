//! Adapter interfaces for the remote event store.
//!
//! The core only talks to the store through [`EventStoreGateway`]; the MISP
//! REST client is one implementation of it.

pub mod misp;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{
    AttributeRecord, EventId, EventSummary, NewEvent, ObjectRecord, ObjectTemplate,
    SightingRecord,
};

// Re-export the MISP adapter
pub use misp::{MispClient, MispSettings};

/// Body returned by a write call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayResponse {
    pub body: Value,
}

impl GatewayResponse {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// Structured errors reported by the store, if any
    pub fn errors(&self) -> Option<&Value> {
        self.body.get("errors")
    }
}

/// Narrow interface the consumer needs from the remote store
#[async_trait]
pub trait EventStoreGateway: Send + Sync {
    /// Create an event and return its id
    async fn create_event(&self, event: &NewEvent) -> Result<EventId>;

    /// Events whose title matches `title_query`
    async fn list_events_by_title(&self, title_query: &str) -> Result<Vec<EventSummary>>;

    async fn list_object_templates(&self) -> Result<Vec<ObjectTemplate>>;

    async fn add_attribute(
        &self,
        event_id: EventId,
        attribute: &AttributeRecord,
    ) -> Result<GatewayResponse>;

    async fn add_object(
        &self,
        event_id: EventId,
        template_id: &str,
        object: &ObjectRecord,
    ) -> Result<GatewayResponse>;

    async fn record_sighting(&self, sighting: &SightingRecord) -> Result<GatewayResponse>;
}
