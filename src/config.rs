//! Configuration for redis2misp.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags
//! 2. Environment variables (MISP_URL, MISP_KEY)
//! 3. Config file (.redis2misp/config.yaml)
//! 4. Defaults
//!
//! Config file discovery:
//! - REDIS2MISP_CONFIG names the file explicitly
//! - Otherwise searches current directory and parents for .redis2misp/config.yaml
//! - Falls back to ~/.redis2misp/config.yaml

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::adapters::MispSettings;
use crate::domain::{DailyEventDefaults, EventId, ItemKind, KeyError, QueueKey};
use crate::ingest::RedisSettings;

pub const CONFIG_DIR: &str = ".redis2misp";
pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_CONFIG: &str = "REDIS2MISP_CONFIG";
pub const ENV_MISP_URL: &str = "MISP_URL";
pub const ENV_MISP_KEY: &str = "MISP_KEY";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub misp: MispConfig,
    #[serde(default)]
    pub daily_event: Option<DailyEventDefaults>,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MispConfig {
    pub url: Option<String>,
    pub key: Option<String>,
    pub verify_cert: Option<bool>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsumerConfig {
    pub poll_interval_secs: Option<u64>,
    pub error_key: Option<String>,
    pub animation: Option<bool>,
    pub refresh_rate: Option<u32>,
}

/// Configuration after merging the file, the environment and defaults
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub redis: RedisSettings,
    pub misp_url: Option<String>,
    pub misp_key: Option<String>,
    pub verify_cert: bool,
    pub timeout_seconds: u64,
    pub daily_event: DailyEventDefaults,
    pub poll_interval_secs: u64,
    pub error_key: Option<String>,
    pub animation: bool,
    pub refresh_rate: u32,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        resolve_config(None, ConfigFile::default(), |_| None)
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

fn find_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(ENV_CONFIG) {
        return Some(PathBuf::from(explicit));
    }

    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file_from(&cwd))
    {
        return Some(found);
    }

    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Merge a parsed file with environment lookups and defaults
fn resolve_config(
    config_file: Option<PathBuf>,
    file: ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let redis_defaults = RedisSettings::default();

    ResolvedConfig {
        config_file,
        redis: RedisSettings {
            host: file.redis.host.unwrap_or(redis_defaults.host),
            port: file.redis.port.unwrap_or(redis_defaults.port),
            db: file.redis.db.unwrap_or(redis_defaults.db),
        },
        misp_url: env(ENV_MISP_URL).or(file.misp.url),
        misp_key: env(ENV_MISP_KEY).or(file.misp.key),
        verify_cert: file.misp.verify_cert.unwrap_or(true),
        timeout_seconds: file.misp.timeout_seconds.unwrap_or(30),
        daily_event: file.daily_event.unwrap_or_default(),
        poll_interval_secs: file.consumer.poll_interval_secs.unwrap_or(1),
        error_key: file.consumer.error_key,
        animation: file.consumer.animation.unwrap_or(true),
        refresh_rate: file.consumer.refresh_rate.unwrap_or(5),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_file = find_config_file();

    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    Ok(resolve_config(config_file, file, |name| {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Invalid combination of consumer options
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("either an event id or an event name is required")]
    MissingTarget,

    #[error("event name must not be empty")]
    EmptyEventName,

    #[error("an error queue key is required (--error-key or consumer.error_key)")]
    MissingErrorKey,

    #[error("at least one queue key is required")]
    NoKeys,

    #[error("invalid queue key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("MISP url is required (--misp-url, MISP_URL or misp.url)")]
    MissingMispUrl,

    #[error("MISP API key is required (--misp-key, MISP_KEY or misp.key)")]
    MissingMispKey,

    #[error("refresh rate must be at least 1 frame per second")]
    InvalidRefreshRate,
}

/// Where attributes and objects go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    /// One fixed event
    Explicit(EventId),
    /// The event of the day for this title template
    Daily(String),
}

/// Consumer options as given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    pub keys: Vec<String>,
    pub event_id: Option<EventId>,
    pub event_name: Option<String>,
    pub error_key: Option<String>,
    pub sleep_secs: Option<u64>,
    pub no_animation: bool,
    pub refresh_rate: Option<u32>,
    pub redis: RedisOverrides,
    pub misp: MispOverrides,
}

#[derive(Debug, Clone, Default)]
pub struct RedisOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<i64>,
}

impl RedisOverrides {
    pub fn apply(&self, base: &RedisSettings) -> RedisSettings {
        RedisSettings {
            host: self.host.clone().unwrap_or_else(|| base.host.clone()),
            port: self.port.unwrap_or(base.port),
            db: self.db.unwrap_or(base.db),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MispOverrides {
    pub url: Option<String>,
    pub key: Option<String>,
    pub insecure: bool,
    pub timeout_seconds: Option<u64>,
}

/// Validated settings for the `consume` command
#[derive(Debug, Clone)]
pub struct ConsumeSettings {
    pub keys: Vec<QueueKey>,
    pub target: EventTarget,
    pub error_key: String,
    pub poll_interval: Duration,
    pub animation: bool,
    pub refresh_rate: u32,
    pub daily_event: DailyEventDefaults,
    pub redis: RedisSettings,
    pub misp: MispSettings,
}

/// Expand a `-k` argument: a full key registers one lane, a base name all three
pub fn expand_key_arg(arg: &str) -> Result<Vec<QueueKey>, KeyError> {
    if ItemKind::classify(arg).is_some() {
        Ok(vec![QueueKey::parse(arg)?])
    } else {
        QueueKey::lanes(arg)
    }
}

impl ConsumeSettings {
    /// Merge command-line options over the resolved configuration
    pub fn resolve(
        options: &ConsumeOptions,
        config: &ResolvedConfig,
    ) -> Result<Self, ConfigurationError> {
        let mut keys: Vec<QueueKey> = Vec::new();
        for arg in &options.keys {
            for key in expand_key_arg(arg)? {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            return Err(ConfigurationError::NoKeys);
        }

        // An explicit id wins over the event name
        let target = match (options.event_id, &options.event_name) {
            (Some(id), _) => EventTarget::Explicit(id),
            (None, Some(name)) if name.trim().is_empty() => {
                return Err(ConfigurationError::EmptyEventName)
            }
            (None, Some(name)) => EventTarget::Daily(name.clone()),
            (None, None) => return Err(ConfigurationError::MissingTarget),
        };

        let error_key = options
            .error_key
            .clone()
            .or_else(|| config.error_key.clone())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigurationError::MissingErrorKey)?;

        let refresh_rate = options.refresh_rate.unwrap_or(config.refresh_rate);
        if refresh_rate == 0 {
            return Err(ConfigurationError::InvalidRefreshRate);
        }

        let misp = misp_settings(&options.misp, config)?;

        Ok(Self {
            keys,
            target,
            error_key,
            poll_interval: Duration::from_secs(
                options.sleep_secs.unwrap_or(config.poll_interval_secs),
            ),
            animation: config.animation && !options.no_animation,
            refresh_rate,
            daily_event: config.daily_event,
            redis: options.redis.apply(&config.redis),
            misp,
        })
    }
}

/// MISP connection settings from flags over the resolved configuration
pub fn misp_settings(
    overrides: &MispOverrides,
    config: &ResolvedConfig,
) -> Result<MispSettings, ConfigurationError> {
    let url = overrides
        .url
        .clone()
        .or_else(|| config.misp_url.clone())
        .filter(|url| !url.is_empty())
        .ok_or(ConfigurationError::MissingMispUrl)?;
    let key = overrides
        .key
        .clone()
        .or_else(|| config.misp_key.clone())
        .filter(|key| !key.is_empty())
        .ok_or(ConfigurationError::MissingMispKey)?;

    Ok(MispSettings {
        url,
        key,
        verify_cert: config.verify_cert && !overrides.insecure,
        timeout: Duration::from_secs(overrides.timeout_seconds.unwrap_or(config.timeout_seconds)),
    })
}

/// Mask all but the last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}
