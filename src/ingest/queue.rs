//! List-oriented queue backends.
//!
//! Producers `push` on the head of a list and the consumer `pop`s from the
//! tail, so each lane is FIFO. Durability belongs to the backend: once an item
//! is popped, nobody but the consumer holds it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors that can occur with a queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Push/pop/length operations on named lists
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a payload to the head of `key`
    async fn push(&self, key: &str, payload: &str) -> Result<(), QueueError>;

    /// Remove and return the oldest payload of `key`, if any
    async fn pop(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Number of payloads waiting on `key`
    async fn len(&self, key: &str) -> Result<usize, QueueError>;

    /// Up to `limit` of the oldest payloads of `key`, oldest first, without removing them
    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError>;
}

/// Connection settings for the Redis backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
        }
    }
}

impl RedisSettings {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Redis lists (LPUSH / RPOP / LLEN)
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
}

impl RedisQueue {
    /// Connect to Redis; the connection manager reconnects on failure
    pub async fn connect(settings: &RedisSettings) -> Result<Self, QueueError> {
        let client = redis::Client::open(settings.url())?;
        let conn = ConnectionManager::new(client).await?;
        tracing::debug!(url = %settings.url(), "Connected to Redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn push(&self, key: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, payload).await?;
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<String> = conn.rpop(key, None).await?;
        Ok(popped)
    }

    async fn len(&self, key: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // The tail holds the oldest payloads
        let start = -isize::try_from(limit).unwrap_or(isize::MAX);
        let mut items: Vec<String> = conn.lrange(key, start, -1).await?;
        items.reverse();
        Ok(items)
    }
}

/// In-process queue with the same list semantics as [`RedisQueue`]
#[derive(Debug, Default)]
pub struct MemoryQueue {
    lanes: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads of `key`, oldest first
    pub fn snapshot(&self, key: &str) -> Vec<String> {
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes
            .get(key)
            .map(|lane| lane.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn push(&self, key: &str, payload: &str) -> Result<(), QueueError> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes
            .entry(key.to_string())
            .or_default()
            .push_front(payload.to_string());
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lanes.get_mut(key).and_then(VecDeque::pop_back))
    }

    async fn len(&self, key: &str) -> Result<usize, QueueError> {
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(lanes.get(key).map(VecDeque::len).unwrap_or(0))
    }

    async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
        let mut items = self.snapshot(key);
        items.truncate(limit);
        Ok(items)
    }
}
