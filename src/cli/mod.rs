//! Command-line interface for redis2misp.
//!
//! Provides commands for consuming queues into MISP, pushing records,
//! inspecting backlogs, replaying failed items and showing configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::adapters::{EventStoreGateway, MispClient};
use crate::config::{
    self, expand_key_arg, mask_secret, ConsumeOptions, ConsumeSettings, EventTarget,
    MispOverrides, RedisOverrides,
};
use crate::core::{
    ErrorSink, EventNameTemplate, EventRouter, ProgressReporter, QueueConsumer, Shutdown,
};
use crate::domain::EventId;
use crate::ingest::{QueueBackend, RedisQueue, RedisSettings};

pub mod errors;
pub mod push;

/// redis2misp - forward queued threat observations into MISP
#[derive(Parser, Debug)]
#[command(name = "redis2misp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume queues into MISP until interrupted
    Consume {
        /// Base name (all three lanes) or full lane key; repeatable
        #[arg(short = 'k', long = "key", required = true, num_args = 1..)]
        keys: Vec<String>,

        /// Push everything into this event (disables daily mode)
        #[arg(short, long)]
        event_id: Option<EventId>,

        /// Daily event title template, e.g. "honeypot_1" or "{date} cowrie"
        #[arg(short = 'n', long)]
        event_name: Option<String>,

        /// Queue receiving items that could not be forwarded
        #[arg(long)]
        error_key: Option<String>,

        /// Seconds to sleep once every queue is empty
        #[arg(short, long)]
        sleep: Option<u64>,

        /// Disable the activity indicator
        #[arg(long)]
        no_animation: bool,

        /// Indicator frames per second
        #[arg(long)]
        refresh_rate: Option<u32>,

        #[command(flatten)]
        redis: RedisArgs,

        #[command(flatten)]
        misp: MispArgs,
    },

    /// Push a record onto a queue
    Push {
        #[command(subcommand)]
        command: push::PushCommands,
    },

    /// Show backlog length per lane
    Status {
        /// Base name or full lane key; repeatable
        #[arg(short = 'k', long = "key", required = true, num_args = 1..)]
        keys: Vec<String>,

        /// Error queue to report as well
        #[arg(long)]
        error_key: Option<String>,

        #[command(flatten)]
        redis: RedisArgs,
    },

    /// Inspect or replay the error queue
    Errors {
        #[command(subcommand)]
        command: errors::ErrorsCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Redis connection flags (override the config file)
#[derive(Args, Debug, Clone, Default)]
pub struct RedisArgs {
    /// Redis host
    #[arg(long = "redis-host")]
    pub host: Option<String>,

    /// Redis port
    #[arg(long = "redis-port")]
    pub port: Option<u16>,

    /// Redis database index
    #[arg(long = "redis-db")]
    pub db: Option<i64>,
}

impl RedisArgs {
    fn overrides(&self) -> RedisOverrides {
        RedisOverrides {
            host: self.host.clone(),
            port: self.port,
            db: self.db,
        }
    }

    /// Settings from these flags over the resolved configuration
    pub fn settings(&self) -> Result<RedisSettings> {
        Ok(self.overrides().apply(&config::config()?.redis))
    }
}

/// MISP connection flags (override environment and config file)
#[derive(Args, Debug, Clone, Default)]
pub struct MispArgs {
    /// MISP base URL
    #[arg(long)]
    pub misp_url: Option<String>,

    /// MISP API key
    #[arg(long)]
    pub misp_key: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl MispArgs {
    fn overrides(&self) -> MispOverrides {
        MispOverrides {
            url: self.misp_url.clone(),
            key: self.misp_key.clone(),
            insecure: self.insecure,
            timeout_seconds: self.timeout,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Consume {
                keys,
                event_id,
                event_name,
                error_key,
                sleep,
                no_animation,
                refresh_rate,
                redis,
                misp,
            } => {
                let options = ConsumeOptions {
                    keys,
                    event_id,
                    event_name,
                    error_key,
                    sleep_secs: sleep,
                    no_animation,
                    refresh_rate,
                    redis: redis.overrides(),
                    misp: misp.overrides(),
                };
                consume(options).await
            }
            Commands::Push { command } => push::execute(command).await,
            Commands::Status {
                keys,
                error_key,
                redis,
            } => show_status(&keys, error_key, &redis).await,
            Commands::Errors { command } => errors::execute(command).await,
            Commands::Config => show_config(),
        }
    }
}

/// Connect to the configured Redis instance
pub(crate) async fn connect_queue(redis: &RedisArgs) -> Result<Arc<dyn QueueBackend>> {
    let settings = redis.settings()?;
    let queue = RedisQueue::connect(&settings)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", settings.url()))?;
    Ok(Arc::new(queue))
}

/// Error queue from the flag, else from configuration
pub(crate) fn error_key_or_config(error_key: Option<String>) -> Result<Option<String>> {
    match error_key {
        Some(key) => Ok(Some(key)),
        None => Ok(config::config()?.error_key.clone()),
    }
}

/// Run the consumer until Ctrl+C
async fn consume(options: ConsumeOptions) -> Result<()> {
    let settings = ConsumeSettings::resolve(&options, config::config()?)?;

    let queue = RedisQueue::connect(&settings.redis)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", settings.redis.url()))?;
    let queue: Arc<dyn QueueBackend> = Arc::new(queue);
    let gateway: Arc<dyn EventStoreGateway> = Arc::new(MispClient::new(&settings.misp)?);

    let mut router = EventRouter::new(gateway).with_defaults(settings.daily_event);
    let event_id = match &settings.target {
        EventTarget::Explicit(id) => Some(*id),
        EventTarget::Daily(name) => {
            router.daily_mode(EventNameTemplate::new(name));
            None
        }
    };

    let sink = ErrorSink::new(queue.clone(), settings.error_key.clone());
    let mut consumer = QueueConsumer::new(queue, router, sink)
        .with_poll_interval(settings.poll_interval)
        .with_event_id(event_id)
        .with_progress(ProgressReporter::new(
            settings.animation,
            settings.refresh_rate,
        ));
    for key in &settings.keys {
        consumer.register_key(key.name())?;
    }

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing up");
            trigger.trigger();
        }
    });

    let summary = consumer.run(shutdown).await?;

    println!();
    println!("Consumer stopped");
    println!("  Forwarded:      {}", summary.items.forwarded);
    println!("  Failed:         {}", summary.items.failed);
    if summary.items.dropped > 0 {
        println!("  Dropped:        {}", summary.items.dropped);
    }
    println!("  Cycles:         {}", summary.cycles);
    if summary.backend_errors > 0 {
        println!("  Backend errors: {}", summary.backend_errors);
    }
    Ok(())
}

/// Show queue backlogs
async fn show_status(keys: &[String], error_key: Option<String>, redis: &RedisArgs) -> Result<()> {
    let queue = connect_queue(redis).await?;

    println!("{:<40} {:>8}", "QUEUE", "WAITING");
    println!("{}", "-".repeat(49));
    for arg in keys {
        for key in expand_key_arg(arg)? {
            let waiting = queue
                .len(key.name())
                .await
                .with_context(|| format!("Failed to read length of {}", key))?;
            println!("{:<40} {:>8}", key.name(), waiting);
        }
    }

    if let Some(error_key) = error_key_or_config(error_key)? {
        let waiting = queue
            .len(&error_key)
            .await
            .with_context(|| format!("Failed to read length of {}", error_key))?;
        println!("{:<40} {:>8}", format!("{} (errors)", error_key), waiting);
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  redis2misp Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Redis:");
    println!("  URL:          {}", cfg.redis.url());
    println!();
    println!("MISP:");
    println!(
        "  URL:          {}",
        cfg.misp_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Key:          {}",
        cfg.misp_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  Verify cert:  {}", cfg.verify_cert);
    println!("  Timeout:      {}s", cfg.timeout_seconds);
    println!();
    println!("Daily events:");
    println!("  Distribution: {}", cfg.daily_event.distribution);
    println!("  Threat level: {}", cfg.daily_event.threat_level);
    println!("  Analysis:     {}", cfg.daily_event.analysis);
    println!("  Published:    {}", cfg.daily_event.published);
    println!();
    println!("Consumer:");
    println!("  Poll interval: {}s", cfg.poll_interval_secs);
    println!(
        "  Error key:     {}",
        cfg.error_key.as_deref().unwrap_or("(not set)")
    );
    println!("  Animation:     {}", cfg.animation);
    println!("  Refresh rate:  {}/s", cfg.refresh_rate);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_consume() {
        let cli = Cli::try_parse_from([
            "redis2misp",
            "consume",
            "-k",
            "honeypot_1",
            "-k",
            "honeypot_2_object",
            "--event-name",
            "honeypot",
            "--error-key",
            "errors",
            "--redis-port",
            "6380",
        ])
        .unwrap();

        match cli.command {
            Commands::Consume {
                keys,
                event_name,
                error_key,
                redis,
                ..
            } => {
                assert_eq!(keys, vec!["honeypot_1", "honeypot_2_object"]);
                assert_eq!(event_name.as_deref(), Some("honeypot"));
                assert_eq!(error_key.as_deref(), Some("errors"));
                assert_eq!(redis.port, Some(6380));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_event_id() {
        let cli =
            Cli::try_parse_from(["redis2misp", "consume", "-k", "hp", "--event-id", "12"]).unwrap();
        match cli.command {
            Commands::Consume { event_id, .. } => assert_eq!(event_id, Some(EventId(12))),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_consume_requires_key() {
        assert!(Cli::try_parse_from(["redis2misp", "consume", "--event-id", "1"]).is_err());
    }
}
