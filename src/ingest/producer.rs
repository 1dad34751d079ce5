//! Producer side: encode records and push them onto a base name's lanes.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::domain::{AttributeRecord, EventId, ItemKind, KeyError, QueueKey, SightingRecord};

use super::codec;
use super::queue::QueueBackend;

/// Pushes records onto `<base>_attribute`, `<base>_object` and `<base>_sighting`
pub struct QueueProducer {
    queue: Arc<dyn QueueBackend>,
    base: String,
}

impl QueueProducer {
    pub fn new(queue: Arc<dyn QueueBackend>, base: &str) -> Result<Self, KeyError> {
        // Validates the base name once for every lane
        QueueKey::lanes(base)?;
        Ok(Self {
            queue,
            base: base.to_string(),
        })
    }

    fn key(&self, kind: ItemKind) -> String {
        format!("{}{}", self.base, kind.suffix())
    }

    pub async fn push_attribute(
        &self,
        record: &AttributeRecord,
        event_id: Option<EventId>,
    ) -> Result<()> {
        let payload =
            codec::encode_attribute(record, event_id).context("Failed to encode attribute")?;
        self.push(ItemKind::Attribute, &payload).await
    }

    pub async fn push_object(
        &self,
        name: &str,
        fields: &Map<String, Value>,
        event_id: Option<EventId>,
    ) -> Result<()> {
        if name.is_empty() {
            anyhow::bail!("Object payload must carry the field 'name'");
        }
        let payload =
            codec::encode_object(name, fields, event_id).context("Failed to encode object")?;
        self.push(ItemKind::Object, &payload).await
    }

    pub async fn push_sighting(&self, record: &SightingRecord) -> Result<()> {
        if !record.has_anchor() {
            anyhow::bail!("Sighting needs one of value, uuid or id");
        }
        let payload = codec::encode_sighting(record).context("Failed to encode sighting")?;
        self.push(ItemKind::Sighting, &payload).await
    }

    /// Push an already encoded payload after checking it decodes for `kind`
    pub async fn push_raw(&self, kind: ItemKind, payload: &str) -> Result<()> {
        codec::decode(kind, payload)
            .with_context(|| format!("Refusing to push invalid {} payload", kind))?;
        self.push(kind, payload).await
    }

    async fn push(&self, kind: ItemKind, payload: &str) -> Result<()> {
        let key = self.key(kind);
        self.queue
            .push(&key, payload)
            .await
            .with_context(|| format!("Failed to push onto {}", key))?;
        tracing::debug!(key = %key, "Pushed {} payload", kind);
        Ok(())
    }
}
