use async_nats::jetstream::consumer::StreamErrorKind;
use async_nats::jetstream::consumer::pull::MessagesErrorKind;
use async_nats::jetstream::context::{CreateStreamErrorKind, GetStreamErrorKind, PublishErrorKind};
use async_nats::jetstream::stream::ConsumerErrorKind;
use thiserror::Error;
use vnats_bridge::BridgeError;
use vnats_bridge::subject::SubjectError;

/// Errors that can occur in the NATS bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// Settling (ack, nak, term) a message failed.
    #[error("failed to settle message: {0}")]
    Ack(String),

    /// Connecting to the servers failed.
    #[error("failed to connect: {0}")]
    Connect(async_nats::ConnectErrorKind),

    /// An existing durable consumer is configured for a different subject or mode.
    #[error("consumer {consumer} already exists with a different configuration: {reason}")]
    ConsumerConflict {
        /// The consumer name.
        consumer: String,

        /// What differs.
        reason: String,
    },

    /// Creating or fetching the consumer failed.
    #[error("failed to create consumer: {0}")]
    CreateConsumer(ConsumerErrorKind),

    /// Creating or fetching the stream failed.
    #[error("failed to create stream: {0}")]
    CreateStream(CreateStreamErrorKind),

    /// Draining the connection failed.
    #[error("failed to drain connection: {0}")]
    Drain(String),

    /// The connection has been drained.
    #[error("connection drained")]
    Drained,

    /// Fetching the stream of a subscription failed.
    #[error("failed to get stream: {0}")]
    GetStream(GetStreamErrorKind),

    /// A delivered message carried no usable `JetStream` metadata.
    #[error("failed to read message info: {0}")]
    Info(String),

    /// A server address could not be parsed.
    #[error("invalid server address {0}")]
    InvalidServer(String),

    /// Receiving from the consumer failed.
    #[error("failed to receive message: {0}")]
    Messages(MessagesErrorKind),

    /// No server addresses were given.
    #[error("no servers given")]
    NoServers,

    /// Publishing failed or was not acknowledged.
    #[error("failed to publish: {0}")]
    Publish(PublishErrorKind),

    /// Opening the consumer's message stream failed.
    #[error("failed to open message stream: {0}")]
    Stream(StreamErrorKind),

    /// The subject is invalid.
    #[error(transparent)]
    Subject(#[from] SubjectError),
}

impl BridgeError for Error {}
