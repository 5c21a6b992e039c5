use std::collections::HashMap;

use bytes::Bytes;

/// A message delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The concrete subject the message was published to.
    pub subject: String,

    /// The message body.
    pub payload: Bytes,

    /// Optional headers.
    pub headers: Option<HashMap<String, String>>,

    /// Sequence of the message within its stream.
    pub stream_sequence: u64,

    /// Number of times the message has been delivered, starting at 1.
    pub delivered: u64,
}

/// A delivered message as handed out by a raw subscription.
pub trait Delivery
where
    Self: Send + Sync + 'static,
{
    /// The message carried by the delivery.
    fn message(&self) -> &Message;
}
