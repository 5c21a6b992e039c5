use thiserror::Error;
use vnats_bridge::BridgeError;
use vnats_bridge::subject::SubjectError;

/// Errors returned by a [`Connection`](crate::Connection) and the publishers
/// it creates.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: BridgeError,
{
    /// The bridge could not establish a session.
    #[error("failed to connect: {0}")]
    Connect(#[source] E),

    /// Draining a subscription or the bridge failed during close.
    #[error("failed to drain: {0}")]
    Drain(#[source] E),

    /// A subject or stream name is malformed.
    #[error(transparent)]
    InvalidSubject(#[from] SubjectError),

    /// The bridge rejected a publish.
    #[error("failed to publish to {subject}: {source}")]
    Publish {
        /// The subject published to.
        subject: String,

        /// The bridge error.
        #[source]
        source: E,
    },

    /// The backend rejected provisioning a stream.
    #[error("failed to provision stream {stream}: {source}")]
    StreamProvision {
        /// The stream name.
        stream: String,

        /// The bridge error.
        #[source]
        source: E,
    },

    /// A publish targeted a subject outside of the publisher's stream.
    #[error("subject {subject} does not belong to stream {stream}")]
    SubjectNotInStream {
        /// The subject published to.
        subject: String,

        /// The publisher's stream.
        stream: String,
    },

    /// A subscription could not be created.
    #[error("failed to subscribe {consumer} to {subject}: {source}")]
    SubscriptionCreate {
        /// The subject subscribed to.
        subject: String,

        /// The consumer name.
        consumer: String,

        /// Why the subscription was refused.
        #[source]
        source: SubscriptionCreateError<E>,
    },
}

/// Cause of an [`Error::SubscriptionCreate`].
#[derive(Debug, Error)]
pub enum SubscriptionCreateError<E>
where
    E: BridgeError,
{
    /// The backend could not provide the stream or the consumer.
    #[error(transparent)]
    Bridge(E),

    /// The subject is malformed or does not name a stream.
    #[error(transparent)]
    InvalidSubject(#[from] SubjectError),
}
