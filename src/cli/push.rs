//! Producer subcommands: enqueue records for the consumer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{AttributeRecord, EventId, ItemKind, SightingRecord, SightingType};
use crate::ingest::QueueProducer;

use super::{connect_queue, RedisArgs};

/// Target lanes of a push
#[derive(Args, Debug, Clone)]
pub struct PushTarget {
    /// Base name; records land on <base>_<kind>
    #[arg(short = 'k', long = "key")]
    pub base: String,

    #[command(flatten)]
    pub redis: RedisArgs,
}

#[derive(Subcommand, Debug)]
pub enum PushCommands {
    /// Push an attribute
    Attribute {
        #[command(flatten)]
        target: PushTarget,

        /// Attribute type (e.g. ip-src, domain, sha256)
        #[arg(short = 't', long = "type")]
        attribute_type: String,

        /// Attribute value
        #[arg(short, long)]
        value: String,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(long)]
        comment: Option<String>,

        /// Flag the attribute for IDS export
        #[arg(long)]
        to_ids: bool,

        #[arg(long)]
        distribution: Option<u8>,

        /// Submit as a proposal
        #[arg(long)]
        proposal: bool,

        /// Target event (otherwise the consumer decides)
        #[arg(short, long)]
        event_id: Option<EventId>,
    },

    /// Push an object built from a JSON field map
    Object {
        #[command(flatten)]
        target: PushTarget,

        /// Object template name (e.g. cowrie, file)
        #[arg(long)]
        name: String,

        /// Field map as a JSON object
        #[arg(long, conflicts_with = "file")]
        fields: Option<String>,

        /// Read the field map from a JSON file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Target event (otherwise the consumer decides)
        #[arg(short, long)]
        event_id: Option<EventId>,
    },

    /// Push a sighting
    Sighting {
        #[command(flatten)]
        target: PushTarget,

        /// Sighted value; repeatable
        #[arg(short, long)]
        value: Vec<String>,

        /// Attribute uuid
        #[arg(long)]
        uuid: Option<Uuid>,

        /// Attribute id
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long)]
        source: Option<String>,

        /// Record a false positive instead of a sighting
        #[arg(long)]
        false_positive: bool,

        /// Seconds since epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Push an already encoded JSON payload after validating it
    Raw {
        #[command(flatten)]
        target: PushTarget,

        #[arg(long, value_enum)]
        kind: KindArg,

        /// JSON payload
        payload: String,
    },
}

/// Lane kind for CLI (maps to ItemKind)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Sighting,
    Attribute,
    Object,
}

impl From<KindArg> for ItemKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Sighting => ItemKind::Sighting,
            KindArg::Attribute => ItemKind::Attribute,
            KindArg::Object => ItemKind::Object,
        }
    }
}

async fn producer(target: &PushTarget) -> Result<QueueProducer> {
    let queue = connect_queue(&target.redis).await?;
    QueueProducer::new(queue, &target.base).context("Invalid base name")
}

/// Parse an object field map
pub fn parse_fields(json: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(json).context("Field map is not valid JSON")? {
        Value::Object(fields) => Ok(fields),
        _ => anyhow::bail!("Field map must be a JSON object"),
    }
}

pub async fn execute(command: PushCommands) -> Result<()> {
    match command {
        PushCommands::Attribute {
            target,
            attribute_type,
            value,
            category,
            comment,
            to_ids,
            distribution,
            proposal,
            event_id,
        } => {
            let record = AttributeRecord {
                category,
                comment,
                to_ids,
                distribution,
                proposal,
                ..AttributeRecord::new(attribute_type, value)
            };
            producer(&target)
                .await?
                .push_attribute(&record, event_id)
                .await?;
            println!("Queued attribute on {}_attribute", target.base);
        }
        PushCommands::Object {
            target,
            name,
            fields,
            file,
            event_id,
        } => {
            let json = match (fields, file) {
                (Some(json), _) => json,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => "{}".to_string(),
            };
            let fields = parse_fields(&json)?;
            producer(&target)
                .await?
                .push_object(&name, &fields, event_id)
                .await?;
            println!("Queued '{}' object on {}_object", name, target.base);
        }
        PushCommands::Sighting {
            target,
            value,
            uuid,
            id,
            source,
            false_positive,
            timestamp,
        } => {
            let mut record = SightingRecord::for_values(value);
            record.uuid = uuid;
            record.id = id;
            record.source = source;
            if false_positive {
                record = record.with_type(SightingType::FalsePositive);
            }
            if let Some(timestamp) = timestamp {
                record = record.with_timestamp(timestamp);
            }
            producer(&target).await?.push_sighting(&record).await?;
            println!("Queued sighting on {}_sighting", target.base);
        }
        PushCommands::Raw {
            target,
            kind,
            payload,
        } => {
            let kind = ItemKind::from(kind);
            producer(&target).await?.push_raw(kind, &payload).await?;
            println!("Queued {} payload on {}{}", kind, target.base, kind.suffix());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields(r#"{"session": "abc", "src_port": 2222}"#).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(parse_fields("[1, 2]").is_err());
        assert!(parse_fields("not json").is_err());
    }

    #[test]
    fn test_parse_push_sighting() {
        let cli = Cli::try_parse_from([
            "redis2misp",
            "push",
            "sighting",
            "-k",
            "hp",
            "-v",
            "8.8.8.8",
            "-v",
            "1.1.1.1",
            "--false-positive",
        ])
        .unwrap();

        match cli.command {
            Commands::Push {
                command:
                    PushCommands::Sighting {
                        target,
                        value,
                        false_positive,
                        ..
                    },
            } => {
                assert_eq!(target.base, "hp");
                assert_eq!(value, vec!["8.8.8.8", "1.1.1.1"]);
                assert!(false_positive);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
