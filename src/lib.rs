//! redis2misp - forward queued threat observations into MISP
//!
//! Producers push JSON records onto Redis lists named after a base name and a
//! kind suffix (`_sighting`, `_attribute`, `_object`). The consumer drains
//! those lists and writes each record into MISP.
//!
//! # Architecture
//!
//! - Every lane is drained to empty before the next one is polled
//! - Records without an event id go to the event of the day, created at most
//!   once per day per event name
//! - A record that cannot be forwarded is written to an error queue and the
//!   drain continues
//!
//! # Modules
//!
//! - `adapters`: External system integrations (MISP)
//! - `core`: Consumer loop, routing, daily event resolution, error sink
//! - `domain`: Data structures (keys, records, objects, events)
//! - `ingest`: Queue backends, payload codec, producer
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Consume honeypot_1_{sighting,attribute,object} into daily events
//! redis2misp consume -k honeypot_1 --event-name honeypot_1 --error-key RedisToMisp_Error
//!
//! # Queue an attribute
//! redis2misp push attribute -k honeypot_1 -t ip-src -v 203.0.113.7
//!
//! # Replay failed items
//! redis2misp errors replay --onto honeypot_1_attribute
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use adapters::{EventStoreGateway, GatewayResponse, MispClient, MispSettings};
pub use crate::core::{DispatchError, EventRouter, QueueConsumer, Shutdown};
pub use domain::{AttributeRecord, EventId, ItemKind, ObjectRecord, QueueKey, SightingRecord};
pub use ingest::{MemoryQueue, QueueBackend, QueueProducer, QueueRecord, RedisQueue};
