//! Event routing: picks the target event and forwards records to the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::{EventStoreGateway, GatewayResponse};
use crate::domain::{AttributeRecord, DailyEventDefaults, EventId, ObjectRecord, SightingRecord};

use super::clock::{Clock, SystemClock};
use super::error::DispatchError;
use super::resolver::{DailyEventResolver, EventNameTemplate};

/// How the target event of attributes and objects is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Every push carries an explicit or embedded event id
    Normal,
    /// Missing ids resolve to the event of the day
    Daily,
}

#[derive(Debug)]
enum ModeState {
    Normal,
    Daily(DailyEventResolver),
}

pub struct EventRouter {
    gateway: Arc<dyn EventStoreGateway>,
    clock: Arc<dyn Clock>,
    defaults: DailyEventDefaults,
    mode: ModeState,
    /// Template name to template id
    templates: BTreeMap<String, String>,
}

impl EventRouter {
    /// A router in normal mode
    pub fn new(gateway: Arc<dyn EventStoreGateway>) -> Self {
        Self {
            gateway,
            clock: Arc::new(SystemClock),
            defaults: DailyEventDefaults::default(),
            mode: ModeState::Normal,
            templates: BTreeMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Classification used for events created in daily mode
    pub fn with_defaults(mut self, defaults: DailyEventDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn normal_mode(&mut self) {
        self.mode = ModeState::Normal;
    }

    /// Switch to daily mode; the daily cache always starts empty
    pub fn daily_mode(&mut self, template: EventNameTemplate) {
        debug!(template = %template.as_str(), "Daily event mode enabled");
        self.mode = ModeState::Daily(DailyEventResolver::new(template, self.defaults));
    }

    pub fn mode(&self) -> OperationMode {
        match self.mode {
            ModeState::Normal => OperationMode::Normal,
            ModeState::Daily(_) => OperationMode::Daily,
        }
    }

    /// Resolver of the daily mode, if active
    pub fn resolver(&self) -> Option<&DailyEventResolver> {
        match &self.mode {
            ModeState::Daily(resolver) => Some(resolver),
            ModeState::Normal => None,
        }
    }

    /// Event id by priority: explicit, then embedded, then daily
    pub async fn target_event_id(
        &mut self,
        explicit: Option<EventId>,
        embedded: Option<EventId>,
    ) -> Result<EventId, DispatchError> {
        if let Some(id) = explicit.or(embedded) {
            return Ok(id);
        }
        match &mut self.mode {
            ModeState::Daily(resolver) => {
                let today = self.clock.today();
                Ok(resolver.resolve(self.gateway.as_ref(), today).await?)
            }
            ModeState::Normal => Err(DispatchError::Configuration(
                "no event id given and daily event mode is off".to_string(),
            )),
        }
    }

    pub async fn add_attribute(
        &mut self,
        explicit: Option<EventId>,
        record: &AttributeRecord,
        embedded: Option<EventId>,
    ) -> Result<EventId, DispatchError> {
        let event_id = self.target_event_id(explicit, embedded).await?;
        let response = self
            .gateway
            .add_attribute(event_id, record)
            .await
            .map_err(remote_failure)?;
        check_response(response)?;
        debug!(event_id = %event_id, value = %record.value, "Attribute added");
        Ok(event_id)
    }

    pub async fn add_object(
        &mut self,
        explicit: Option<EventId>,
        record: &ObjectRecord,
        embedded: Option<EventId>,
    ) -> Result<EventId, DispatchError> {
        // An unknown template fails before any event is looked up or created
        let template_id = self.template_id(&record.name).await?;
        let event_id = self.target_event_id(explicit, embedded).await?;
        let response = self
            .gateway
            .add_object(event_id, &template_id, record)
            .await
            .map_err(remote_failure)?;
        check_response(response)?;
        debug!(event_id = %event_id, template = %record.name, "Object added");
        Ok(event_id)
    }

    pub async fn record_sighting(&self, record: &SightingRecord) -> Result<(), DispatchError> {
        let response = self
            .gateway
            .record_sighting(record)
            .await
            .map_err(remote_failure)?;
        check_response(response)
    }

    /// Template id by name; the list is refetched on a miss
    async fn template_id(&mut self, name: &str) -> Result<String, DispatchError> {
        if let Some(id) = self.templates.get(name) {
            return Ok(id.clone());
        }

        let templates = self
            .gateway
            .list_object_templates()
            .await
            .map_err(remote_failure)?;
        self.templates = templates
            .into_iter()
            .map(|template| (template.name, template.id))
            .collect();

        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownTemplate {
                name: name.to_string(),
                valid: self
                    .templates
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

fn remote_failure(err: anyhow::Error) -> DispatchError {
    DispatchError::RemoteWrite(format!("{:#}", err))
}

fn check_response(response: GatewayResponse) -> Result<(), DispatchError> {
    match response.errors() {
        Some(errors) => Err(DispatchError::RemoteWrite(errors.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_response() {
        assert!(check_response(GatewayResponse::new(json!({"Attribute": {}}))).is_ok());
        let err = check_response(GatewayResponse::new(json!({"errors": "duplicate"}))).unwrap_err();
        assert_eq!(err.tag(), "remote_write");
        assert!(err.to_string().contains("duplicate"));
    }
}
