//! The polling consumer.
//!
//! One cycle drains every registered key in registration order, each until
//! the backend reports it empty. Between cycles the consumer sleeps for the
//! poll interval. Items are dispatched one at a time; a failed item goes to
//! the error queue and the drain moves on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::domain::{EventId, KeyError, QueueKey};
use crate::ingest::codec;
use crate::ingest::{QueueBackend, QueueError, QueueRecord};

use super::error::DispatchError;
use super::error_sink::ErrorSink;
use super::progress::ProgressReporter;
use super::router::EventRouter;
use super::shutdown::Shutdown;

/// Item counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Items accepted by the remote store
    pub forwarded: u64,
    /// Items diverted to the error queue
    pub failed: u64,
    /// Failed items whose error record could not be written either
    pub dropped: u64,
}

impl DrainStats {
    fn since(&self, earlier: &DrainStats) -> DrainStats {
        DrainStats {
            forwarded: self.forwarded - earlier.forwarded,
            failed: self.failed - earlier.failed,
            dropped: self.dropped - earlier.dropped,
        }
    }

    pub fn processed(&self) -> u64 {
        self.forwarded + self.failed
    }
}

/// Outcome of [`QueueConsumer::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items: DrainStats,
    pub cycles: u64,
    pub backend_errors: u64,
}

pub struct QueueConsumer {
    queue: Arc<dyn QueueBackend>,
    router: EventRouter,
    sink: ErrorSink,
    progress: ProgressReporter,
    keys: Vec<QueueKey>,
    poll_interval: Duration,
    /// Overrides any embedded or daily event id
    event_id: Option<EventId>,
    totals: DrainStats,
}

impl QueueConsumer {
    pub fn new(queue: Arc<dyn QueueBackend>, router: EventRouter, sink: ErrorSink) -> Self {
        Self {
            queue,
            router,
            sink,
            progress: ProgressReporter::disabled(),
            keys: Vec::new(),
            poll_interval: Duration::from_secs(1),
            event_id: None,
            totals: DrainStats::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_event_id(mut self, event_id: Option<EventId>) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut EventRouter {
        &mut self.router
    }

    /// Registered keys, in drain order
    pub fn keys(&self) -> &[QueueKey] {
        &self.keys
    }

    /// Register the sighting, attribute and object lanes of `base`
    pub fn register_base(&mut self, base: &str) -> Result<(), KeyError> {
        for key in QueueKey::lanes(base)? {
            self.add_key(key);
        }
        Ok(())
    }

    /// Register one full key such as `honeypot_1_attribute`
    pub fn register_key(&mut self, key: &str) -> Result<(), KeyError> {
        let key = QueueKey::parse(key)?;
        self.add_key(key);
        Ok(())
    }

    fn add_key(&mut self, key: QueueKey) {
        if self.keys.contains(&key) {
            debug!(key = %key, "Key already registered");
        } else {
            self.keys.push(key);
        }
    }

    /// Poll until `shutdown` fires
    #[instrument(skip_all, fields(keys = self.keys.len()))]
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<RunSummary> {
        if self.keys.is_empty() {
            anyhow::bail!("No queue keys registered");
        }
        info!(
            mode = ?self.router.mode(),
            error_key = %self.sink.key(),
            "Consumer started"
        );

        let mut summary = RunSummary::default();
        while !shutdown.is_triggered() {
            summary.cycles += 1;
            match self.drain_cycle(&mut shutdown).await {
                Ok(stats) if stats.processed() > 0 => {
                    debug!(forwarded = stats.forwarded, failed = stats.failed, "Cycle done");
                }
                Ok(_) => {}
                Err(e) => {
                    summary.backend_errors += 1;
                    warn!(error = %e, "Queue backend failed; backing off");
                }
            }

            if shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        summary.items = self.totals;
        info!(
            forwarded = summary.items.forwarded,
            failed = summary.items.failed,
            cycles = summary.cycles,
            "Consumer stopped"
        );
        Ok(summary)
    }

    /// Drain every registered key once.
    ///
    /// A backend failure abandons the rest of the cycle.
    #[instrument(skip_all)]
    pub async fn drain_cycle(&mut self, shutdown: &mut Shutdown) -> Result<DrainStats, QueueError> {
        let before = self.totals;
        let keys = self.keys.clone();
        for key in &keys {
            if shutdown.is_triggered() {
                break;
            }
            self.drain_key(key.name(), shutdown).await?;
        }
        Ok(self.totals.since(&before))
    }

    /// Pop and dispatch from `key` until it is empty or shutdown fires.
    ///
    /// With the indicator on, the lane length is read once per drain (after
    /// the first pop) and counted down locally for the label.
    pub async fn drain_key(&mut self, key: &str, shutdown: &mut Shutdown) -> Result<(), QueueError> {
        let mut waiting: Option<usize> = None;
        let mut first = true;
        while !shutdown.is_triggered() {
            let Some(raw) = self.queue.pop(key).await? else {
                break;
            };

            if first {
                first = false;
                if self.progress.is_enabled() {
                    waiting = self.queue.len(key).await.ok();
                }
            } else {
                waiting = waiting.map(|w| w.saturating_sub(1));
            }

            match self.dispatch_with_progress(key, &raw, waiting, shutdown).await {
                Ok(()) => self.totals.forwarded += 1,
                Err(e) => {
                    self.totals.failed += 1;
                    warn!(key = %key, tag = e.tag(), error = %e, "Dispatch failed");
                    if !self.sink.record(&e, &raw).await {
                        self.totals.dropped += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Dispatch under a progress indicator, abandoning it on shutdown
    async fn dispatch_with_progress(
        &mut self,
        key: &str,
        raw: &str,
        waiting: Option<usize>,
        shutdown: &mut Shutdown,
    ) -> Result<(), DispatchError> {
        let handle = self.progress.start_for(progress_label(key, waiting));

        let result = tokio::select! {
            result = self.dispatch_one(key, raw) => result,
            _ = shutdown.wait() => Err(DispatchError::Interrupted),
        };

        handle.stop().await;
        result
    }

    /// Classify, decode and forward one raw item
    #[instrument(skip(self, raw), fields(key = %key))]
    pub async fn dispatch_one(&mut self, key: &str, raw: &str) -> Result<(), DispatchError> {
        let kind = QueueKey::parse(key)?.kind();
        let explicit = self.event_id;

        match codec::decode(kind, raw)? {
            QueueRecord::Sighting(record) => self.router.record_sighting(&record).await,
            QueueRecord::Attribute { record, event_id } => self
                .router
                .add_attribute(explicit, &record, event_id)
                .await
                .map(|_| ()),
            QueueRecord::Object { record, event_id } => self
                .router
                .add_object(explicit, &record, event_id)
                .await
                .map(|_| ()),
        }
    }
}

fn progress_label(key: &str, waiting: Option<usize>) -> String {
    match waiting {
        Some(waiting) => format!("{} ({} waiting)", key, waiting),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{EventStoreGateway, GatewayResponse};
    use crate::domain::{
        AttributeRecord, EventSummary, NewEvent, ObjectRecord, ObjectTemplate, SightingRecord,
    };
    use crate::ingest::MemoryQueue;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullGateway;

    /// Memory queue counting length lookups
    #[derive(Default)]
    struct CountingQueue {
        inner: MemoryQueue,
        len_calls: AtomicUsize,
    }

    #[async_trait]
    impl QueueBackend for CountingQueue {
        async fn push(&self, key: &str, payload: &str) -> Result<(), QueueError> {
            self.inner.push(key, payload).await
        }
        async fn pop(&self, key: &str) -> Result<Option<String>, QueueError> {
            self.inner.pop(key).await
        }
        async fn len(&self, key: &str) -> Result<usize, QueueError> {
            self.len_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.len(key).await
        }
        async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
            self.inner.peek(key, limit).await
        }
    }

    #[async_trait]
    impl EventStoreGateway for NullGateway {
        async fn create_event(&self, _event: &NewEvent) -> Result<EventId> {
            Ok(EventId(1))
        }
        async fn list_events_by_title(&self, _q: &str) -> Result<Vec<EventSummary>> {
            Ok(Vec::new())
        }
        async fn list_object_templates(&self) -> Result<Vec<ObjectTemplate>> {
            Ok(Vec::new())
        }
        async fn add_attribute(&self, _id: EventId, _a: &AttributeRecord) -> Result<GatewayResponse> {
            Ok(GatewayResponse::default())
        }
        async fn add_object(
            &self,
            _id: EventId,
            _t: &str,
            _o: &ObjectRecord,
        ) -> Result<GatewayResponse> {
            Ok(GatewayResponse::default())
        }
        async fn record_sighting(&self, _s: &SightingRecord) -> Result<GatewayResponse> {
            Ok(GatewayResponse::default())
        }
    }

    fn consumer() -> QueueConsumer {
        let queue = Arc::new(MemoryQueue::new());
        let router = EventRouter::new(Arc::new(NullGateway));
        let sink = ErrorSink::new(queue.clone(), "errors");
        QueueConsumer::new(queue, router, sink)
    }

    #[test]
    fn test_register_base_order_and_dedup() {
        let mut consumer = consumer();
        consumer.register_base("hp").unwrap();
        consumer.register_key("hp_attribute").unwrap();

        let names: Vec<&str> = consumer.keys().iter().map(QueueKey::name).collect();
        assert_eq!(names, vec!["hp_sighting", "hp_attribute", "hp_object"]);
    }

    #[test]
    fn test_register_key_rejects_unknown_suffix() {
        let mut consumer = consumer();
        assert!(consumer.register_key("hp_events").is_err());
        assert!(consumer.register_base("").is_err());
        assert!(consumer.keys().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_one_invalid_key() {
        let mut consumer = consumer();
        let err = consumer.dispatch_one("hp_events", "{}").await.unwrap_err();
        assert_eq!(err.tag(), "no_valid_key");
    }

    #[tokio::test]
    async fn test_run_without_keys_fails() {
        let mut consumer = consumer();
        assert!(consumer.run(Shutdown::never()).await.is_err());
    }

    #[tokio::test]
    async fn test_indicator_reads_lane_length_once_per_drain() {
        let queue = Arc::new(CountingQueue::default());
        for value in ["a", "b", "c"] {
            queue.push("hp_sighting", &format!(r#"{{"value": "{}"}}"#, value)).await.unwrap();
        }
        let router = EventRouter::new(Arc::new(NullGateway));
        let sink = ErrorSink::new(queue.clone(), "errors");
        let mut consumer = QueueConsumer::new(queue.clone(), router, sink)
            .with_progress(ProgressReporter::new(true, 50));
        consumer.register_key("hp_sighting").unwrap();

        let stats = consumer.drain_cycle(&mut Shutdown::never()).await.unwrap();

        assert_eq!(stats.forwarded, 3);
        assert_eq!(queue.len_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_progress_label() {
        assert_eq!(progress_label("hp_object", Some(4)), "hp_object (4 waiting)");
        assert_eq!(progress_label("hp_object", None), "hp_object");
    }
}
