//! Overflow queue for items that could not be forwarded.

use std::fmt::Display;
use std::sync::Arc;

use tracing::error;

use crate::domain::ErrorRecord;
use crate::ingest::codec;
use crate::ingest::QueueBackend;

/// Appends `{error, item}` records to the error queue
pub struct ErrorSink {
    queue: Arc<dyn QueueBackend>,
    key: String,
}

impl ErrorSink {
    pub fn new(queue: Arc<dyn QueueBackend>, key: impl Into<String>) -> Self {
        Self {
            queue,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Record a failed item. Returns false when the record was dropped.
    pub async fn record(&self, err: &dyn Display, item: &str) -> bool {
        let record = ErrorRecord::new(err.to_string(), item);
        error!(error_key = %self.key, error = %record.error, "Item diverted to error queue");

        let payload = match codec::encode_error(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, item = %item, "Failed to encode error record; dropped");
                return false;
            }
        };

        match self.queue.push(&self.key, &payload).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    error_key = %self.key,
                    error = %e,
                    record = %payload,
                    "Failed to write error record; dropped"
                );
                false
            }
        }
    }
}
