//! Abstract interface between the vnats core and a message-streaming backend.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod logger;
mod message;
mod mode;
mod stream;

/// Subjects are dot-delimited routing keys, optionally containing wildcards.
pub mod subject;

pub use logger::{LogLevel, Logger};
pub use message::{Delivery, Message};
pub use mode::SubscriptionMode;
pub use stream::{
    DEFAULT_DUPLICATE_WINDOW, PublishAck, RetentionPolicy, StorageType, StreamConfig, StreamInfo,
};

use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for bridge errors
pub trait BridgeError: Debug + Error + Send + Sync + 'static {}

/// Marker trait for bridge options
pub trait BridgeOptions: Clone + Debug + Send + Sync + 'static {}

/// A session with a message-streaming backend.
///
/// The bridge owns every transport concern: resolving servers, framing,
/// reconnection and provisioning of streams and consumers. Implementations
/// must be safe to share between tasks; the bridge is the serialization point
/// for concurrent publishes.
#[async_trait]
pub trait Bridge
where
    Self: Sized + Send + Sync + 'static,
{
    /// The error type for the bridge.
    type Error: BridgeError;

    /// The options for the bridge.
    type Options: BridgeOptions;

    /// The raw subscription type created by the bridge.
    type Subscription: RawSubscription<Error = Self::Error>;

    /// Opens a session to the first reachable server in `servers`.
    async fn connect(
        servers: &[String],
        options: Self::Options,
        logger: Logger,
    ) -> Result<Self, Self::Error>;

    /// Returns the stream described by `config`, creating it if it does not exist.
    async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Self::Error>;

    /// Creates a subscription that pulls messages matching `subject` through the
    /// durable consumer `consumer_name`.
    ///
    /// The first token of `subject` names the stream. The consumer is created if
    /// it does not exist and is configured according to `mode`.
    ///
    /// For [`SubscriptionMode::SingleSubscriberStrictMessageOrder`] the backend
    /// must hand out at most one unsettled message at a time and redeliver a
    /// nak'd message before any later one. The delivery loop only warns when a
    /// different message arrives while a redelivery is pending; it still
    /// processes it, so ordering rests on the adapter.
    ///
    /// An existing consumer whose filter subject or mode differs from the
    /// request must be rejected rather than silently reused.
    async fn create_subscription(
        &self,
        subject: &str,
        consumer_name: &str,
        mode: SubscriptionMode,
    ) -> Result<Self::Subscription, Self::Error>;

    /// Returns the ordered list of known server addresses.
    fn servers(&self) -> Vec<String>;

    /// Publishes `payload` to `subject`, using `dedup_key` as the message id the
    /// backend deduplicates on.
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        dedup_key: &str,
    ) -> Result<PublishAck, Self::Error>;

    /// Stops accepting new work, flushes in-flight work and closes the session.
    async fn drain(&self) -> Result<(), Self::Error>;
}

/// A pull subscription bound to one subject through one consumer.
///
/// All methods take `&self`: `drain` is called by the owning connection while
/// a delivery loop may be suspended in `next`.
#[async_trait]
pub trait RawSubscription
where
    Self: Send + Sync + 'static,
{
    /// The error type for the subscription.
    type Error: BridgeError;

    /// A delivered message together with whatever the backend needs to settle it.
    type Delivery: Delivery;

    /// Waits for the next message.
    ///
    /// Returns `None` once the subscription has been drained or closed. On a
    /// strict-order consumer nothing after a nak'd message may be returned
    /// until that message has been redelivered and settled.
    async fn next(&self) -> Option<Result<Self::Delivery, Self::Error>>;

    /// Acknowledges successful processing; the message will not be redelivered.
    async fn ack(&self, delivery: &Self::Delivery) -> Result<(), Self::Error>;

    /// Requests redelivery, optionally after `delay`.
    async fn nak(
        &self,
        delivery: &Self::Delivery,
        delay: Option<Duration>,
    ) -> Result<(), Self::Error>;

    /// Drops the message permanently.
    async fn term(&self, delivery: &Self::Delivery) -> Result<(), Self::Error>;

    /// Stops pulling new messages. Subsequent calls to `next` return `None`.
    async fn drain(&self) -> Result<(), Self::Error>;
}
