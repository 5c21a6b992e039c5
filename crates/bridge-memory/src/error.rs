use thiserror::Error;
use vnats_bridge::BridgeError;
use vnats_bridge::subject::SubjectError;

/// Errors returned by the in-memory bridge.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The consumer exists with a different filter subject or mode.
    #[error("consumer `{consumer}` on stream `{stream}` exists with a different configuration")]
    ConsumerConflict {
        /// The stream name.
        stream: String,
        /// The consumer name.
        consumer: String,
    },

    /// The bridge has been drained.
    #[error("connection drained")]
    Drained,

    /// Draining the bridge failed.
    #[error("failed to drain connection")]
    DrainFailed,

    /// No stream captures the subject.
    #[error("no stream captures subject `{0}`")]
    NoStreamForSubject(String),

    /// No server addresses were given.
    #[error("no servers given")]
    NoServers,

    /// The message is not pending on the consumer.
    #[error("message {sequence} is not pending on consumer `{consumer}`")]
    NotPending {
        /// The consumer name.
        consumer: String,
        /// The stream sequence of the message.
        sequence: u64,
    },

    /// The backend refused to create the stream.
    #[error("stream `{0}` rejected by server")]
    StreamRejected(String),

    /// The stream does not exist.
    #[error("stream `{0}` not found")]
    StreamNotFound(String),

    /// The subject is invalid.
    #[error(transparent)]
    Subject(#[from] SubjectError),

    /// Draining the subscription failed.
    #[error("failed to drain subscription of consumer `{0}`")]
    SubscriptionDrainFailed(String),

    /// The subjects of a new stream overlap with those of an existing one.
    #[error("subjects of stream `{stream}` overlap with stream `{existing}`")]
    SubjectOverlap {
        /// The stream being created.
        stream: String,
        /// The stream already capturing the subjects.
        existing: String,
    },

    /// The backend is not reachable.
    #[error("server unavailable")]
    Unavailable,

    /// None of the given servers is reachable.
    #[error("no reachable server in [{0}]")]
    Unreachable(String),
}

impl BridgeError for Error {}
