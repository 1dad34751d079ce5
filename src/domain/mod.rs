//! Domain types for the queue-to-MISP forwarder.
//!
//! This module contains the core data structures:
//! - Keys: queue lanes and item-kind classification
//! - Records: attributes, sightings and error records
//! - Object: template-driven composite objects
//! - Event: remote event ids and daily event metadata

pub mod event;
pub mod keys;
pub mod object;
pub mod records;

// Re-export commonly used types
pub use event::{DailyEventDefaults, EventId, EventSummary, NewEvent, ObjectTemplate};
pub use keys::{ItemKind, KeyError, QueueKey};
pub use object::{ObjectAttribute, ObjectProfile, ObjectRecord};
pub use records::{AttributeRecord, ErrorRecord, SightingRecord, SightingType};
