//! Process configuration loaded from the environment.

use std::time::Duration;

use crate::queue::DEFAULT_MAX_DELIVERIES;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_QUEUE_STREAM: &str = "mediaconv:process-image";
const DEFAULT_QUEUE_GROUP: &str = "process-image-workers";
const DEFAULT_QUEUE_CONSUMER: &str = "worker-1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_CLAIM_IDLE_MS: u64 = 60_000;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{name} must be set when {because}")]
    Missing {
        name: &'static str,
        because: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerKind {
    Canned,
    OpenAi {
        api_key: String,
        base_url: String,
        model: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub redis_url: Option<String>,
    pub stream: String,
    pub group: String,
    /// Stable per-process name, so a restarted worker re-reads its own pending entries.
    pub consumer: String,
    pub max_deliveries: u32,
    pub poll_interval: Duration,
    /// Pending entries idle this long are claimed by the next receive.
    pub claim_idle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub http_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Postgres stores when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub queue: QueueConfig,
    pub analyzer: AnalyzerKind,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let log_format = match or("LOG_FORMAT", "json").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected json or pretty, got {other}"),
                });
            }
        };

        let max_deliveries: u32 = parse(
            "QUEUE_MAX_DELIVERIES",
            get("QUEUE_MAX_DELIVERIES"),
            DEFAULT_MAX_DELIVERIES,
        )?;
        if max_deliveries == 0 {
            return Err(ConfigError::Invalid {
                name: "QUEUE_MAX_DELIVERIES",
                reason: "must be at least 1".to_string(),
            });
        }
        let poll_ms: u64 = parse(
            "QUEUE_POLL_INTERVAL_MS",
            get("QUEUE_POLL_INTERVAL_MS"),
            DEFAULT_POLL_INTERVAL_MS,
        )?;

        let claim_idle_ms: u64 = parse(
            "QUEUE_CLAIM_IDLE_MS",
            get("QUEUE_CLAIM_IDLE_MS"),
            DEFAULT_CLAIM_IDLE_MS,
        )?;

        let api_key = get("OPENAI_API_KEY");
        let default_analyzer = if api_key.is_some() { "openai" } else { "canned" };
        let analyzer_name = or("ANALYZER", default_analyzer).to_ascii_lowercase();

        let analyzer = match analyzer_name.as_str() {
            "canned" => AnalyzerKind::Canned,
            "openai" => AnalyzerKind::OpenAi {
                api_key: api_key.ok_or(ConfigError::Missing {
                    name: "OPENAI_API_KEY",
                    because: "ANALYZER=openai",
                })?,
                base_url: or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
                model: or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "ANALYZER",
                    reason: format!("expected openai or canned, got {other}"),
                });
            }
        };

        Ok(Self {
            http_addr: or("HTTP_ADDR", DEFAULT_HTTP_ADDR),
            log_level: or("LOG_LEVEL", "info"),
            log_format,
            database_url: get("DATABASE_URL"),
            queue: QueueConfig {
                redis_url: get("REDIS_URL"),
                stream: or("QUEUE_STREAM", DEFAULT_QUEUE_STREAM),
                group: or("QUEUE_GROUP", DEFAULT_QUEUE_GROUP),
                consumer: or("QUEUE_CONSUMER", DEFAULT_QUEUE_CONSUMER),
                max_deliveries,
                poll_interval: Duration::from_millis(poll_ms),
                claim_idle: Duration::from_millis(claim_idle_ms),
            },
            analyzer,
        })
    }
}

fn parse<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: format!("{raw:?}: {e}"),
        }),
    }
}
