//! Error queue subcommands.
//!
//! - `list`: show failed items without removing them
//! - `replay`: move failed items back onto a lane for another attempt

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::warn;

use crate::domain::QueueKey;
use crate::ingest::codec;
use crate::ingest::QueueBackend;

use super::{connect_queue, error_key_or_config, RedisArgs};

#[derive(Subcommand, Debug)]
pub enum ErrorsCommands {
    /// Show the oldest error records
    List {
        /// Error queue (defaults to consumer.error_key)
        #[arg(long)]
        error_key: Option<String>,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[command(flatten)]
        redis: RedisArgs,
    },

    /// Push failed items back onto a lane, oldest first
    Replay {
        /// Full lane key receiving the items, e.g. honeypot_1_attribute
        #[arg(long)]
        onto: String,

        /// Error queue (defaults to consumer.error_key)
        #[arg(long)]
        error_key: Option<String>,

        /// Maximum number of records to replay (default: all)
        #[arg(short, long)]
        limit: Option<usize>,

        #[command(flatten)]
        redis: RedisArgs,
    },
}

/// Outcome of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    /// Records that did not decode and went back onto the error queue
    pub kept: usize,
}

/// Move up to `limit` error records from `error_key` onto `onto`.
///
/// Only records present when the replay starts are visited, so records
/// pushed back are never seen twice. A record whose item cannot be pushed
/// onto `onto` is pushed back onto `error_key` before the error is returned.
pub async fn replay(
    queue: &dyn QueueBackend,
    error_key: &str,
    onto: &QueueKey,
    limit: Option<usize>,
) -> Result<ReplayReport> {
    let waiting = queue
        .len(error_key)
        .await
        .with_context(|| format!("Failed to read length of {}", error_key))?;
    let budget = limit.map_or(waiting, |limit| limit.min(waiting));

    let mut report = ReplayReport::default();
    for _ in 0..budget {
        let Some(raw) = queue
            .pop(error_key)
            .await
            .with_context(|| format!("Failed to pop from {}", error_key))?
        else {
            break;
        };

        match codec::decode_error(&raw) {
            Ok(record) => {
                if let Err(e) = queue.push(onto.name(), &record.item).await {
                    // The record must not leave both queues
                    queue
                        .push(error_key, &raw)
                        .await
                        .with_context(|| format!("Failed to restore record onto {}", error_key))?;
                    return Err(e).with_context(|| format!("Failed to push onto {}", onto));
                }
                report.replayed += 1;
            }
            Err(e) => {
                warn!(error = %e, "Unreadable error record; keeping it");
                queue
                    .push(error_key, &raw)
                    .await
                    .with_context(|| format!("Failed to push back onto {}", error_key))?;
                report.kept += 1;
            }
        }
    }
    Ok(report)
}

fn require_error_key(error_key: Option<String>) -> Result<String> {
    error_key_or_config(error_key)?
        .context("No error queue given (--error-key or consumer.error_key)")
}

pub async fn execute(command: ErrorsCommands) -> Result<()> {
    match command {
        ErrorsCommands::List {
            error_key,
            limit,
            redis,
        } => {
            let error_key = require_error_key(error_key)?;
            let queue = connect_queue(&redis).await?;
            let total = queue.len(&error_key).await?;
            let records = queue.peek(&error_key, limit).await?;

            println!("{} record(s) on {} (showing {})", total, error_key, records.len());
            for (idx, raw) in records.iter().enumerate() {
                match codec::decode_error(raw) {
                    Ok(record) => {
                        println!();
                        println!("#{} {}", idx + 1, record.error);
                        println!("   {}", record.item);
                    }
                    Err(_) => {
                        println!();
                        println!("#{} (unreadable) {}", idx + 1, raw);
                    }
                }
            }
        }
        ErrorsCommands::Replay {
            onto,
            error_key,
            limit,
            redis,
        } => {
            let onto = QueueKey::parse(&onto).context("Invalid replay target")?;
            let error_key = require_error_key(error_key)?;
            let queue = connect_queue(&redis).await?;

            let report = replay(queue.as_ref(), &error_key, &onto, limit).await?;
            println!("Replayed {} item(s) onto {}", report.replayed, onto);
            if report.kept > 0 {
                println!("Kept {} unreadable record(s) on {}", report.kept, error_key);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::domain::ErrorRecord;
    use crate::ingest::{MemoryQueue, QueueError};

    /// Memory queue that refuses pushes onto one key
    struct RefusingQueue {
        inner: MemoryQueue,
        refused: &'static str,
    }

    #[async_trait]
    impl QueueBackend for RefusingQueue {
        async fn push(&self, key: &str, payload: &str) -> Result<(), QueueError> {
            if key == self.refused {
                return Err(QueueError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection reset",
                ))));
            }
            self.inner.push(key, payload).await
        }

        async fn pop(&self, key: &str) -> Result<Option<String>, QueueError> {
            self.inner.pop(key).await
        }

        async fn len(&self, key: &str) -> Result<usize, QueueError> {
            self.inner.len(key).await
        }

        async fn peek(&self, key: &str, limit: usize) -> Result<Vec<String>, QueueError> {
            self.inner.peek(key, limit).await
        }
    }

    #[tokio::test]
    async fn test_replay_moves_items_oldest_first() {
        let queue = MemoryQueue::new();
        for item in ["first", "second"] {
            let record = codec::encode_error(&ErrorRecord::new("boom", item)).unwrap();
            queue.push("errors", &record).await.unwrap();
        }
        queue.push("errors", "garbage").await.unwrap();

        let onto = QueueKey::parse("hp_attribute").unwrap();
        let report = replay(&queue, "errors", &onto, None).await.unwrap();

        assert_eq!(report, ReplayReport { replayed: 2, kept: 1 });
        assert_eq!(queue.snapshot("hp_attribute"), vec!["first", "second"]);
        assert_eq!(queue.snapshot("errors"), vec!["garbage"]);
    }

    #[tokio::test]
    async fn test_replay_respects_limit() {
        let queue = MemoryQueue::new();
        for item in ["a", "b", "c"] {
            let record = codec::encode_error(&ErrorRecord::new("boom", item)).unwrap();
            queue.push("errors", &record).await.unwrap();
        }

        let onto = QueueKey::parse("hp_sighting").unwrap();
        let report = replay(&queue, "errors", &onto, Some(2)).await.unwrap();

        assert_eq!(report.replayed, 2);
        assert_eq!(queue.len("errors").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replay_keeps_record_when_target_push_fails() {
        let queue = RefusingQueue {
            inner: MemoryQueue::new(),
            refused: "hp_attribute",
        };
        let record = codec::encode_error(&ErrorRecord::new("boom", "1.1.1.1")).unwrap();
        queue.push("errors", &record).await.unwrap();

        let onto = QueueKey::parse("hp_attribute").unwrap();
        assert!(replay(&queue, "errors", &onto, None).await.is_err());

        assert_eq!(queue.inner.snapshot("errors"), vec![record]);
        assert!(queue.inner.snapshot("hp_attribute").is_empty());
    }
}
