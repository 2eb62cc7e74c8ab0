//! Ingestion configuration.

use std::time::Duration;

use persona_core::ConfigError;

/// Default capacity of the message queue between fetch and handle.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Default capacity of the error queue feeding respond-error.
pub const DEFAULT_ERROR_BUFFER_SIZE: usize = 1;

/// Publish attempts per error report, including the first.
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;

pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_GROUP_ID: &str = "persona-ingest";

/// Configuration for the ingestion pipeline and its broker adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub brokers: Vec<String>,
    /// Topic carrying inbound name messages.
    pub read_topic: String,
    /// Topic receiving failed messages.
    pub error_topic: String,
    pub group_id: String,
    /// Message queue capacity (clamped to at least 1).
    pub buffer_size: usize,
    /// Error queue capacity (clamped to at least 1).
    pub error_buffer_size: usize,
    pub publish_attempts: u32,
    pub retry_backoff: Duration,
    /// Deadline for a single publish attempt.
    pub publish_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            read_topic: String::new(),
            error_topic: String::new(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            error_buffer_size: DEFAULT_ERROR_BUFFER_SIZE,
            publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl IngestConfig {
    /// Create IngestConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `PERSONA_KAFKA_BROKERS`: Comma-separated broker list
    /// - `PERSONA_KAFKA_READ_TOPIC`: Inbound topic
    /// - `PERSONA_KAFKA_ERROR_TOPIC`: Error topic
    /// - `PERSONA_KAFKA_GROUP_ID`: Consumer group (default: persona-ingest)
    /// - `PERSONA_INGEST_BUFFER_SIZE`: Message queue capacity (default: 64)
    /// - `PERSONA_INGEST_ERROR_BUFFER_SIZE`: Error queue capacity (default: 1)
    /// - `PERSONA_INGEST_PUBLISH_ATTEMPTS`: Attempts per error report (default: 3)
    /// - `PERSONA_INGEST_RETRY_BACKOFF_MS`: Pause between attempts (default: 250)
    /// - `PERSONA_INGEST_PUBLISH_TIMEOUT_MS`: Per-attempt deadline (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let brokers = std::env::var("PERSONA_KAFKA_BROKERS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            brokers,
            read_topic: std::env::var("PERSONA_KAFKA_READ_TOPIC").unwrap_or_default(),
            error_topic: std::env::var("PERSONA_KAFKA_ERROR_TOPIC").unwrap_or_default(),
            group_id: std::env::var("PERSONA_KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            buffer_size: env_parse::<usize>("PERSONA_INGEST_BUFFER_SIZE")
                .unwrap_or(defaults.buffer_size)
                .max(1),
            error_buffer_size: env_parse::<usize>("PERSONA_INGEST_ERROR_BUFFER_SIZE")
                .unwrap_or(defaults.error_buffer_size)
                .max(1),
            publish_attempts: env_parse("PERSONA_INGEST_PUBLISH_ATTEMPTS")
                .unwrap_or(defaults.publish_attempts),
            retry_backoff: env_parse("PERSONA_INGEST_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            publish_timeout: env_parse("PERSONA_INGEST_PUBLISH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_timeout),
        }
    }

    /// Check the fields the broker adapters need.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_topic.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "PERSONA_KAFKA_READ_TOPIC".to_string(),
            });
        }
        if self.error_topic.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "PERSONA_KAFKA_ERROR_TOPIC".to_string(),
            });
        }
        if self.brokers.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "PERSONA_KAFKA_BROKERS".to_string(),
            });
        }
        if self.publish_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PERSONA_INGEST_PUBLISH_ATTEMPTS".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        Ok(())
    }

    /// Create a configuration for tests: tiny queues and fast retries.
    pub fn testing() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            read_topic: "fio".to_string(),
            error_topic: "fio-failed".to_string(),
            buffer_size: 1,
            error_buffer_size: 1,
            retry_backoff: Duration::from_millis(5),
            publish_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }
}
