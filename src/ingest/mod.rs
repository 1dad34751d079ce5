//! Queue ingestion: backends, payload codec and producer.
//!
//! # Architecture
//!
//! ```text
//! Producer → <base>_{sighting,attribute,object} (Redis lists) → Consumer
//!                                                       ↓ on failure
//!                                                  error queue
//! ```

pub mod codec;
pub mod producer;
pub mod queue;

// Re-export key types
pub use codec::{DecodeError, QueueRecord};
pub use producer::QueueProducer;
pub use queue::{MemoryQueue, QueueBackend, QueueError, RedisQueue, RedisSettings};
