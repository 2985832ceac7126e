//! NATS transport for firing notifications.
//!
//! The publisher sends plain core-NATS messages on the trigger subject.
//! A JetStream stream with interest retention captures that subject, and
//! every subscriber instance reads it through its own ephemeral pull
//! consumer, so each instance sees every firing (fan-out). Messages
//! published while no consumer exists are not retained.
//!
//! This module provides:
//! - `NatsEventPublisher`: lazily connected [`EventPublisher`]
//! - `NatsEventSubscriber`: consumer loop feeding a [`Dispatcher`]

use crate::dispatch::{Dispatcher, Disposition, FiringRecorder, RetryPolicy, encode_trigger};
use crate::error::{PublishError, SubscribeError};
use crate::publisher::EventPublisher;
use crate::trigger::Trigger;
use async_nats::jetstream;
use async_nats::jetstream::AckKind;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;

/// Subject firing notifications are published on.
const TRIGGER_EVENTS_SUBJECT: &str = "trigger.events";

/// Subject undeliverable notifications are parked on.
const DEAD_LETTER_SUBJECT: &str = "trigger.events.dead";

/// Stream capturing the trigger subject.
const TRIGGER_EVENTS_STREAM: &str = "TRIGGER_EVENTS";

/// Header carrying the reason a message was dead-lettered.
const DEAD_LETTER_REASON_HEADER: &str = "Tripwire-Dead-Letter-Reason";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long the broker keeps a message no consumer has acknowledged.
const STREAM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// How long the broker waits for an ack before redelivering.
const ACK_WAIT: Duration = Duration::from_secs(30);

/// Idle time after which the broker removes a vanished instance's consumer.
const CONSUMER_INACTIVE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Connection settings for the trigger broker.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL.
    pub url: String,
    /// Trigger subject (defaults to `trigger.events`).
    pub subject: Option<String>,
    /// Dead-letter subject (defaults to `trigger.events.dead`).
    pub dead_letter_subject: Option<String>,
    /// Stream name (defaults to `TRIGGER_EVENTS`).
    pub stream_name: Option<String>,
    /// Bound on connect and publish round trips (defaults to 5s).
    pub timeout: Option<Duration>,
}

impl NatsConfig {
    /// Creates a new config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject: None,
            dead_letter_subject: None,
            stream_name: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_deref().unwrap_or(TRIGGER_EVENTS_SUBJECT)
    }

    #[must_use]
    pub fn dead_letter_subject(&self) -> &str {
        self.dead_letter_subject
            .as_deref()
            .unwrap_or(DEAD_LETTER_SUBJECT)
    }

    #[must_use]
    pub fn stream_name(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(TRIGGER_EVENTS_STREAM)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    async fn connect(&self) -> Result<async_nats::Client, String> {
        tokio::time::timeout(self.timeout(), async_nats::connect(&self.url))
            .await
            .map_err(|_| format!("timed out connecting to {}", self.url))?
            .map_err(|e| e.to_string())
    }
}

/// Publishes due triggers as core-NATS messages.
///
/// Connects on first use. Any send failure drops the connection so the
/// next publish reconnects.
pub struct NatsEventPublisher {
    config: NatsConfig,
    client: Mutex<Option<async_nats::Client>>,
}

impl NatsEventPublisher {
    /// Creates a publisher. Does not connect.
    #[must_use]
    pub fn new(config: NatsConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<async_nats::Client, PublishError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = self
            .config
            .connect()
            .await
            .map_err(|message| PublishError::ConnectFailed { message })?;
        tracing::info!(url = %self.config.url, "connected trigger publisher");
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn disconnect(&self) {
        *self.client.lock().await = None;
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, trigger: &Trigger) -> Result<(), PublishError> {
        let bytes =
            encode_trigger(trigger).map_err(|message| PublishError::SerializeFailed { message })?;
        let client = self.client().await?;
        let subject = self.config.subject().to_string();

        let sent = tokio::time::timeout(self.config.timeout(), async {
            client
                .publish(subject, bytes.into())
                .await
                .map_err(|e| e.to_string())?;
            client.flush().await.map_err(|e| e.to_string())
        })
        .await
        .unwrap_or_else(|_| Err("timed out flushing publish".to_string()));

        if let Err(message) = sent {
            self.disconnect().await;
            return Err(PublishError::SendFailed { message });
        }
        Ok(())
    }
}

/// Reads firing notifications and settles each one per its [`Disposition`].
pub struct NatsEventSubscriber {
    client: async_nats::Client,
    consumer: jetstream::consumer::PullConsumer,
    config: NatsConfig,
}

impl NatsEventSubscriber {
    /// Connects, ensures the stream exists, and creates this instance's
    /// ephemeral consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, stream or consumer setup fails.
    pub async fn connect(
        config: NatsConfig,
        retry: &RetryPolicy,
    ) -> tripwire_core::Result<Self, SubscribeError> {
        let client = config
            .connect()
            .await
            .map_err(|message| SubscribeError::ConnectFailed { message })?;
        let jetstream = jetstream::new(client.clone());

        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name().to_string(),
                subjects: vec![config.subject().to_string()],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::Interest,
                max_age: STREAM_MAX_AGE,
                ..Default::default()
            })
            .await
            .map_err(|e| SubscribeError::StreamSetup {
                message: e.to_string(),
            })?;

        let consumer = stream
            .create_consumer(jetstream::consumer::pull::Config {
                filter_subject: config.subject().to_string(),
                deliver_policy: jetstream::consumer::DeliverPolicy::New,
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                ack_wait: ACK_WAIT,
                max_deliver: i64::from(retry.max_attempts) + 1,
                inactive_threshold: CONSUMER_INACTIVE_THRESHOLD,
                ..Default::default()
            })
            .await
            .map_err(|e| SubscribeError::ConsumerSetup {
                message: e.to_string(),
            })?;

        tracing::info!(
            stream = config.stream_name(),
            subject = config.subject(),
            "trigger subscriber ready"
        );

        Ok(Self {
            client,
            consumer,
            config,
        })
    }

    /// Consumes messages until the stream ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the message stream cannot be opened or ends.
    pub async fn run<R: FiringRecorder>(
        &self,
        dispatcher: &Dispatcher<R>,
    ) -> Result<(), SubscribeError> {
        let mut messages =
            self.consumer
                .messages()
                .await
                .map_err(|e| SubscribeError::Receive {
                    message: e.to_string(),
                })?;

        while let Some(message) = messages.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to receive trigger message");
                    continue;
                }
            };

            let attempt = message
                .info()
                .ok()
                .and_then(|info| u32::try_from(info.delivered).ok())
                .unwrap_or(1);
            let disposition = dispatcher.dispatch(&message.payload, attempt).await;
            self.settle(&message, disposition).await;
        }

        Err(SubscribeError::Receive {
            message: "message stream ended".to_string(),
        })
    }

    async fn settle(&self, message: &jetstream::Message, disposition: Disposition) {
        let acked = match disposition {
            Disposition::Ack => message.ack().await,
            Disposition::Retry { delay } => message.ack_with(AckKind::Nak(Some(delay))).await,
            Disposition::DeadLetter { reason } => {
                self.dead_letter(&message.payload, &reason).await;
                message.ack_with(AckKind::Term).await
            }
        };
        if let Err(e) = acked {
            tracing::warn!(error = %e, "failed to settle trigger message");
        }
    }

    async fn dead_letter(&self, payload: &[u8], reason: &str) {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(DEAD_LETTER_REASON_HEADER, reason);
        let subject = self.config.dead_letter_subject().to_string();
        if let Err(e) = self
            .client
            .publish_with_headers(subject, headers, payload.to_vec().into())
            .await
        {
            tracing::error!(error = %e, %reason, "failed to dead-letter trigger message");
        }
    }
}
