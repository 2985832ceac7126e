//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables. Nested
//! sections use `__` as the separator, e.g. `NATS__URL` or
//! `RETENTION__ARCHIVE_AFTER_SECONDS`.

use serde::Deserialize;
use std::time::Duration;
use tripwire_scheduler::{NatsConfig, RetentionError, RetentionPolicy, RetryPolicy};

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    #[serde(default)]
    pub database: DatabaseConfig,

    pub auth: AuthConfig,

    #[serde(default)]
    pub nats: BrokerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub subscriber: SubscriberConfig,

    #[serde(default)]
    pub retention: RetentionConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8989".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    5
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long to wait for a pooled connection, in seconds.
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_seconds() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
        }
    }
}

/// Bearer token validation.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret tokens are signed with.
    pub hs256_secret: String,

    /// Clock skew tolerated on `exp`, in seconds.
    #[serde(default)]
    pub leeway_seconds: u64,
}

/// NATS connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_nats_url")]
    pub url: String,
    pub subject: Option<String>,
    pub dead_letter_subject: Option<String>,
    pub stream: Option<String>,
    #[serde(default = "default_nats_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_timeout_seconds() -> u64 {
    5
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            subject: None,
            dead_letter_subject: None,
            stream: None,
            timeout_seconds: default_nats_timeout_seconds(),
        }
    }
}

impl BrokerConfig {
    #[must_use]
    pub fn to_nats_config(&self) -> NatsConfig {
        NatsConfig {
            url: self.url.clone(),
            subject: self.subject.clone(),
            dead_letter_subject: self.dead_letter_subject.clone(),
            stream_name: self.stream.clone(),
            timeout: Some(Duration::from_secs(self.timeout_seconds)),
        }
    }
}

/// The minute poller. Run it in exactly one process.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

/// The firing subscriber.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl SubscriberConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

/// Event retention thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_archive_after_seconds")]
    pub archive_after_seconds: i64,

    #[serde(default = "default_remove_after_seconds")]
    pub remove_after_seconds: i64,
}

fn default_archive_after_seconds() -> i64 {
    60
}

fn default_remove_after_seconds() -> i64 {
    120
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            archive_after_seconds: default_archive_after_seconds(),
            remove_after_seconds: default_remove_after_seconds(),
        }
    }
}

impl RetentionConfig {
    /// # Errors
    ///
    /// Returns an error if the thresholds are negative or out of order.
    pub fn policy(&self) -> Result<RetentionPolicy, RetentionError> {
        RetentionPolicy::from_secs(self.archive_after_seconds, self.remove_after_seconds)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_defaults() {
        let subscriber = SubscriberConfig::default();
        assert!(subscriber.enabled);
        assert_eq!(subscriber.max_attempts, 5);

        let retry = subscriber.retry_policy();
        assert_eq!(retry.base_delay, Duration::from_millis(500));
        assert_eq!(retry.max_delay, Duration::from_secs(30));

        assert!(SchedulerConfig::default().enabled);
        assert_eq!(DatabaseConfig::default().max_connections, 5);
    }

    #[test]
    fn default_retention_is_valid() {
        let policy = RetentionConfig::default().policy().unwrap();
        assert_eq!(policy, RetentionPolicy::default());
    }

    #[test]
    fn inverted_retention_is_rejected() {
        let config = RetentionConfig {
            archive_after_seconds: 300,
            remove_after_seconds: 60,
        };
        assert!(config.policy().is_err());
    }

    #[test]
    fn broker_config_maps_overrides() {
        let broker = BrokerConfig {
            subject: Some("acme.triggers".to_string()),
            ..BrokerConfig::default()
        };
        let nats = broker.to_nats_config();
        assert_eq!(nats.subject(), "acme.triggers");
        assert_eq!(nats.stream_name(), "TRIGGER_EVENTS");
        assert_eq!(nats.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn deserializes_nested_sections() {
        let config = config::Config::builder()
            .set_override("database_url", "postgres://localhost/tripwire")
            .unwrap()
            .set_override("auth.hs256_secret", "s3cret")
            .unwrap()
            .set_override("scheduler.enabled", false)
            .unwrap()
            .build()
            .unwrap();
        let server: ServerConfig = config.try_deserialize().unwrap();
        assert_eq!(server.listen_addr, "0.0.0.0:8989");
        assert!(!server.scheduler.enabled);
        assert!(server.subscriber.enabled);
        assert_eq!(server.auth.leeway_seconds, 0);
    }
}
