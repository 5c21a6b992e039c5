//! Publishers and subscribers over a persistent, deduplicating message stream.
//!
//! A [`Connection`] owns one bridge session. Publishers created from it send
//! into a stream with a caller-supplied deduplication key. Subscribers pull
//! from a durable consumer, hand each message to a [`MessageHandler`] and
//! acknowledge, redeliver or terminate it depending on the outcome and the
//! [`SubscriptionMode`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod error;
mod handler;
mod options;
mod publisher;
mod subscriber;

#[cfg(feature = "nats")]
pub use connection::NatsConnection;
pub use connection::Connection;
pub use error::{Error, SubscriptionCreateError};
pub use handler::{HandlerError, MessageHandler};
pub use options::{Backoff, ConnectOptions, CreatePublisherArgs, CreateSubscriberArgs, RetryPolicy};
pub use publisher::Publisher;

pub use vnats_bridge::subject;
pub use vnats_bridge::{Bridge, LogLevel, Logger, Message, SubscriptionMode};
