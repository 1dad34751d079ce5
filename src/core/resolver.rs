//! Daily event resolution.
//!
//! Maps an event-name template plus a calendar date to one remote event id.
//! The id is cached until the date rolls over, so repeated polling costs at
//! most one list and one create call per day.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::adapters::EventStoreGateway;
use crate::domain::{DailyEventDefaults, EventId, EventSummary, NewEvent};

use super::error::ResolveError;

const DATE_TOKEN: &str = "{date}";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Event title template, e.g. `honeypot_1` or `{date} cowrie sensor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNameTemplate {
    template: String,
}

impl EventNameTemplate {
    /// A template without a `{date}` token gets ` {date}` appended
    pub fn new(template: &str) -> Self {
        let template = if template.contains(DATE_TOKEN) {
            template.to_string()
        } else {
            format!("{} {}", template, DATE_TOKEN)
        };
        Self { template }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Title of the event for `date`
    pub fn instantiate(&self, date: NaiveDate) -> String {
        self.template
            .replace(DATE_TOKEN, &date.format(DATE_FORMAT).to_string())
    }

    /// Title with an empty date, used as the search query
    pub fn search_query(&self) -> String {
        self.template.replace(DATE_TOKEN, "")
    }
}

/// The id resolved for one date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyEventCache {
    resolved_date: Option<NaiveDate>,
    event_id: Option<EventId>,
}

impl DailyEventCache {
    /// Cached id, only while it was resolved for `today`
    pub fn get(&self, today: NaiveDate) -> Option<EventId> {
        match (self.resolved_date, self.event_id) {
            (Some(date), Some(id)) if date == today => Some(id),
            _ => None,
        }
    }

    fn store(&mut self, date: NaiveDate, event_id: EventId) {
        self.resolved_date = Some(date);
        self.event_id = Some(event_id);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Fetch-or-create state machine for the daily event
#[derive(Debug, Clone)]
pub struct DailyEventResolver {
    template: EventNameTemplate,
    defaults: DailyEventDefaults,
    cache: DailyEventCache,
}

impl DailyEventResolver {
    pub fn new(template: EventNameTemplate, defaults: DailyEventDefaults) -> Self {
        Self {
            template,
            defaults,
            cache: DailyEventCache::default(),
        }
    }

    pub fn template(&self) -> &EventNameTemplate {
        &self.template
    }

    pub fn cache(&self) -> &DailyEventCache {
        &self.cache
    }

    /// Event id for `today`, creating the event on the first miss of the day.
    ///
    /// A failed list or create leaves the cache untouched.
    pub async fn resolve(
        &mut self,
        gateway: &dyn EventStoreGateway,
        today: NaiveDate,
    ) -> Result<EventId, ResolveError> {
        if let Some(id) = self.cache.get(today) {
            return Ok(id);
        }

        let title = self.template.instantiate(today);
        let query = self.template.search_query();
        debug!(query = %query, title = %title, "Resolving daily event");

        let candidates = gateway
            .list_events_by_title(&query)
            .await
            .map_err(|e| ResolveError::List {
                query: query.clone(),
                reason: format!("{:#}", e),
            })?;

        let event_id = match select_exact_match(&candidates, &title) {
            Some(id) => {
                debug!(event_id = %id, "Found existing daily event");
                id
            }
            None => {
                let event = NewEvent::daily(title.clone(), today, &self.defaults);
                let id = gateway
                    .create_event(&event)
                    .await
                    .map_err(|e| ResolveError::Create {
                        title: title.clone(),
                        reason: format!("{:#}", e),
                    })?;
                info!(event_id = %id, title = %title, "Created daily event");
                id
            }
        };

        self.cache.store(today, event_id);
        Ok(event_id)
    }
}

/// Lowest id among the events titled exactly `title`
pub fn select_exact_match(candidates: &[EventSummary], title: &str) -> Option<EventId> {
    let mut matches: Vec<EventId> = candidates
        .iter()
        .filter(|event| event.info == title)
        .map(|event| event.id)
        .collect();
    matches.sort();

    if matches.len() > 1 {
        warn!(
            title = %title,
            count = matches.len(),
            chosen = %matches[0],
            "Several events share the daily title; using the lowest id"
        );
    }
    matches.first().copied()
}
