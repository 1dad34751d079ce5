//! Queue key naming and item-kind classification.
//!
//! A queue key is a base name plus one of three literal suffixes. The suffix
//! alone decides which handler an item popped from that key is routed to.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SUFFIX_SIGHTING: &str = "_sighting";
pub const SUFFIX_ATTRIBUTE: &str = "_attribute";
pub const SUFFIX_OBJECT: &str = "_object";

/// Errors raised while registering or classifying a queue key
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Can't define action to perform for key '{0}' (expected suffix _sighting, _attribute or _object)")]
    NoValidSuffix(String),

    #[error("Queue key '{0}' has an empty base name")]
    EmptyBase(String),
}

/// The kind of record carried by a queue lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Sighting,
    Attribute,
    Object,
}

impl ItemKind {
    /// All kinds, in lane registration order
    pub const ALL: [ItemKind; 3] = [ItemKind::Sighting, ItemKind::Attribute, ItemKind::Object];

    /// Literal key suffix for this kind
    pub fn suffix(self) -> &'static str {
        match self {
            ItemKind::Sighting => SUFFIX_SIGHTING,
            ItemKind::Attribute => SUFFIX_ATTRIBUTE,
            ItemKind::Object => SUFFIX_OBJECT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Sighting => "sighting",
            ItemKind::Attribute => "attribute",
            ItemKind::Object => "object",
        }
    }

    /// Classify a raw key by its suffix
    pub fn classify(key: &str) -> Option<ItemKind> {
        Self::ALL.into_iter().find(|kind| key.ends_with(kind.suffix()))
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated queue key: `<base><suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    base: String,
    kind: ItemKind,
    name: String,
}

impl QueueKey {
    /// Build a key from a base name and a kind
    pub fn new(base: &str, kind: ItemKind) -> Result<Self, KeyError> {
        if base.is_empty() {
            return Err(KeyError::EmptyBase(format!("{}{}", base, kind.suffix())));
        }
        Ok(Self {
            base: base.to_string(),
            kind,
            name: format!("{}{}", base, kind.suffix()),
        })
    }

    /// Parse a full key, rejecting keys without a known suffix
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let kind =
            ItemKind::classify(key).ok_or_else(|| KeyError::NoValidSuffix(key.to_string()))?;
        let base = &key[..key.len() - kind.suffix().len()];
        Self::new(base, kind).map_err(|_| KeyError::EmptyBase(key.to_string()))
    }

    /// The three lanes registered for one base name
    pub fn lanes(base: &str) -> Result<Vec<QueueKey>, KeyError> {
        ItemKind::ALL
            .into_iter()
            .map(|kind| Self::new(base, kind))
            .collect()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Full key name as stored in the queue backend
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
