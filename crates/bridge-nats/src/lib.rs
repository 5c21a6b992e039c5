//! Implementation of the bridge using NATS `JetStream`.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod subscription;

pub use error::Error;
pub use subscription::{NatsDelivery, NatsSubscription};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::{Client, ConnectOptions, ServerAddr};
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::consumer::{AckPolicy, Config as ConsumerConfig};
use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::context::Publish;
use async_nats::jetstream::stream::{
    Config as NatsStreamConfig, RetentionPolicy as NatsRetentionPolicy,
    StorageType as NatsStorageType,
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};
use vnats_bridge::subject;
use vnats_bridge::{
    Bridge, BridgeOptions, Logger, PublishAck, RetentionPolicy, StorageType, StreamConfig,
    StreamInfo, SubscriptionMode,
};

const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for the NATS bridge.
#[derive(Clone, Debug, Default)]
pub struct NatsBridgeOptions {
    /// Client name reported to the server.
    pub name: Option<String>,

    /// Timeout for establishing the connection. Defaults to 5 seconds if not set.
    pub connection_timeout: Option<Duration>,

    /// How long the server waits for an acknowledgement before redelivering.
    /// Defaults to 30 seconds if not set.
    pub ack_wait: Option<Duration>,
}
impl BridgeOptions for NatsBridgeOptions {}

/// A session with a NATS server.
#[derive(Clone, Debug)]
pub struct NatsBridge {
    ack_wait: Duration,
    client: Client,
    drained: Arc<AtomicBool>,
    jetstream_context: JetStreamContext,
    logger: Logger,
    servers: Vec<String>,
}

impl NatsBridge {
    /// The underlying NATS client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.drained.load(Ordering::Acquire) {
            return Err(Error::Drained);
        }

        Ok(())
    }
}

fn stream_config(config: StreamConfig) -> NatsStreamConfig {
    NatsStreamConfig {
        name: config.name,
        subjects: config.subjects,
        retention: match config.retention {
            RetentionPolicy::Limits => NatsRetentionPolicy::Limits,
            RetentionPolicy::Interest => NatsRetentionPolicy::Interest,
            RetentionPolicy::WorkQueue => NatsRetentionPolicy::WorkQueue,
        },
        storage: match config.storage {
            StorageType::File => NatsStorageType::File,
            StorageType::Memory => NatsStorageType::Memory,
        },
        duplicate_window: config.duplicate_window,
        num_replicas: config.num_replicas,
        ..Default::default()
    }
}

fn consumer_config(
    subject: &str,
    consumer_name: &str,
    mode: SubscriptionMode,
    ack_wait: Duration,
) -> PullConsumerConfig {
    PullConsumerConfig {
        durable_name: Some(consumer_name.to_string()),
        filter_subject: subject.to_string(),
        ack_policy: AckPolicy::Explicit,
        ack_wait,
        max_ack_pending: mode.max_ack_pending().unwrap_or_default(),
        ..Default::default()
    }
}

/// Rejects a durable consumer that was created for another subject or mode.
fn check_consumer(
    existing: &ConsumerConfig,
    subject: &str,
    consumer_name: &str,
    mode: SubscriptionMode,
) -> Result<(), Error> {
    let conflict = |reason: String| Error::ConsumerConflict {
        consumer: consumer_name.to_string(),
        reason,
    };

    if existing.filter_subject != subject {
        return Err(conflict(format!(
            "filter subject is {}, requested {subject}",
            existing.filter_subject
        )));
    }

    // multiple mode leaves max_ack_pending to the server default
    let existing_strict = existing.max_ack_pending == 1;
    if existing_strict != mode.is_strict() {
        return Err(conflict(format!(
            "max ack pending is {}, requested {mode}",
            existing.max_ack_pending
        )));
    }

    Ok(())
}

#[async_trait]
impl Bridge for NatsBridge {
    type Error = Error;

    type Options = NatsBridgeOptions;

    type Subscription = NatsSubscription;

    async fn connect(
        servers: &[String],
        options: NatsBridgeOptions,
        logger: Logger,
    ) -> Result<Self, Error> {
        if servers.is_empty() {
            return Err(Error::NoServers);
        }

        let mut connect_options = ConnectOptions::new()
            .connection_timeout(
                options
                    .connection_timeout
                    .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            )
            .event_callback({
                let logger = logger.clone();
                move |event| {
                    let logger = logger.clone();
                    async move {
                        logger.debug(format_args!("NATS event: {event}"));
                        debug!(%event, "nats connection event");
                    }
                }
            });

        if let Some(name) = options.name {
            connect_options = connect_options.name(name);
        }

        let addresses = servers
            .iter()
            .map(|server| {
                server
                    .parse::<ServerAddr>()
                    .map_err(|e| Error::InvalidServer(format!("{server}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = connect_options
            .connect(addresses)
            .await
            .map_err(|e| Error::Connect(e.kind()))?;

        info!(servers = ?servers, "connected to nats");

        Ok(Self {
            ack_wait: options.ack_wait.unwrap_or(DEFAULT_ACK_WAIT),
            jetstream_context: async_nats::jetstream::new(client.clone()),
            client,
            drained: Arc::new(AtomicBool::new(false)),
            logger,
            servers: servers.to_vec(),
        })
    }

    async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Error> {
        self.check_open()?;

        let stream = self
            .jetstream_context
            .get_or_create_stream(stream_config(config))
            .await
            .map_err(|e| Error::CreateStream(e.kind()))?;

        let info = stream.cached_info();
        debug!(stream = %info.config.name, messages = info.state.messages, "stream ensured");

        Ok(StreamInfo {
            name: info.config.name.clone(),
            subjects: info.config.subjects.clone(),
            messages: info.state.messages,
            last_sequence: info.state.last_sequence,
        })
    }

    async fn create_subscription(
        &self,
        subject: &str,
        consumer_name: &str,
        mode: SubscriptionMode,
    ) -> Result<NatsSubscription, Error> {
        self.check_open()?;

        let stream_name = subject::stream_name(subject)?;

        let stream = self
            .jetstream_context
            .get_stream(stream_name)
            .await
            .map_err(|e| Error::GetStream(e.kind()))?;

        let consumer = stream
            .get_or_create_consumer(
                consumer_name,
                consumer_config(subject, consumer_name, mode, self.ack_wait),
            )
            .await
            .map_err(|e| Error::CreateConsumer(e.kind()))?;

        if let Err(e) = check_consumer(&consumer.cached_info().config, subject, consumer_name, mode)
        {
            warn!(%subject, consumer = %consumer_name, error = %e, "refusing mismatched consumer");
            return Err(e);
        }

        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Stream(e.kind()))?;

        self.logger.debug(format_args!(
            "Subscribed to {subject} through consumer {consumer_name} ({mode})"
        ));

        Ok(NatsSubscription::new(consumer_name.to_string(), messages))
    }

    fn servers(&self) -> Vec<String> {
        self.servers.clone()
    }

    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        dedup_key: &str,
    ) -> Result<PublishAck, Error> {
        self.check_open()?;

        subject::validate_concrete(subject)?;

        let ack = self
            .jetstream_context
            .send_publish(
                subject.to_string(),
                Publish::build().payload(payload).message_id(dedup_key),
            )
            .await
            .map_err(|e| Error::Publish(e.kind()))?
            .await
            .map_err(|e| Error::Publish(e.kind()))?;

        if ack.duplicate {
            debug!(%subject, %dedup_key, sequence = ack.sequence, "duplicate publish discarded");
        }

        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }

    async fn drain(&self) -> Result<(), Error> {
        self.check_open()?;

        if let Err(e) = self.client.drain().await {
            warn!(error = %e, "failed to drain nats connection");
            return Err(Error::Drain(e.to_string()));
        }

        self.drained.store(true, Ordering::Release);
        info!(servers = ?self.servers, "nats connection drained");

        Ok(())
    }
}
