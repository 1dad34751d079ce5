//! Error taxonomy for the dispatch path.

use thiserror::Error;

use crate::domain::KeyError;
use crate::ingest::DecodeError;

/// The daily event id could not be resolved
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("failed to list events matching '{query}': {reason}")]
    List { query: String, reason: String },

    #[error("failed to create event '{title}': {reason}")]
    Create { title: String, reason: String },
}

/// Why one queue item could not be forwarded
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("no valid key: {0}")]
    NoValidKey(#[from] KeyError),

    #[error("event resolution failed: {0}")]
    EventResolution(#[from] ResolveError),

    #[error("remote write failed: {0}")]
    RemoteWrite(String),

    #[error("unknown object template '{name}' (valid: {valid})")]
    UnknownTemplate { name: String, valid: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("interrupted before the item was forwarded")]
    Interrupted,
}

impl DispatchError {
    /// Stable tag for log fields
    pub fn tag(&self) -> &'static str {
        match self {
            DispatchError::Decode(_) => "decode",
            DispatchError::NoValidKey(_) => "no_valid_key",
            DispatchError::EventResolution(_) => "event_resolution",
            DispatchError::RemoteWrite(_) => "remote_write",
            DispatchError::UnknownTemplate { .. } => "unknown_template",
            DispatchError::Configuration(_) => "configuration",
            DispatchError::Interrupted => "interrupted",
        }
    }
}
