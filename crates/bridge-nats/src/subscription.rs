use crate::Error;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use async_nats::HeaderMap;
use async_nats::jetstream::AckKind;
use async_nats::jetstream::Message as JetStreamMessage;
use async_nats::jetstream::consumer::pull::Stream as PullStream;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vnats_bridge::{Delivery, Message, RawSubscription};

/// A message pulled from a `JetStream` consumer.
#[derive(Debug)]
pub struct NatsDelivery {
    message: Message,
    inner: JetStreamMessage,
}

impl NatsDelivery {
    fn new(inner: JetStreamMessage) -> Result<Self, Error> {
        let info = inner.info().map_err(|e| Error::Info(e.to_string()))?;

        let message = Message {
            subject: inner.subject.to_string(),
            payload: inner.payload.clone(),
            headers: inner.headers.as_ref().and_then(extract_headers),
            stream_sequence: info.stream_sequence,
            delivered: u64::try_from(info.delivered).unwrap_or(1),
        };

        Ok(Self { message, inner })
    }

    async fn settle(&self, kind: AckKind) -> Result<(), Error> {
        self.inner
            .ack_with(kind)
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }
}

impl Delivery for NatsDelivery {
    fn message(&self) -> &Message {
        &self.message
    }
}

fn extract_headers(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let result: HashMap<String, String> = headers
        .iter()
        .filter_map(|(key, values)| {
            values
                .first()
                .map(|value| (key.to_string(), value.to_string()))
        })
        .collect();

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// A pull subscription on a durable `JetStream` consumer.
pub struct NatsSubscription {
    consumer_name: String,
    drain_token: CancellationToken,
    messages: Mutex<PullStream>,
}

impl NatsSubscription {
    pub(crate) fn new(consumer_name: String, messages: PullStream) -> Self {
        Self {
            consumer_name,
            drain_token: CancellationToken::new(),
            messages: Mutex::new(messages),
        }
    }

    /// The consumer the subscription is bound to.
    #[must_use]
    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }
}

impl Debug for NatsSubscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("NatsSubscription")
            .field("consumer_name", &self.consumer_name)
            .field("drained", &self.drain_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RawSubscription for NatsSubscription {
    type Error = Error;

    type Delivery = NatsDelivery;

    async fn next(&self) -> Option<Result<NatsDelivery, Error>> {
        let mut messages = tokio::select! {
            biased;
            () = self.drain_token.cancelled() => return None,
            messages = self.messages.lock() => messages,
        };

        tokio::select! {
            biased;
            () = self.drain_token.cancelled() => None,
            message = messages.next() => match message? {
                Ok(message) => Some(NatsDelivery::new(message)),
                Err(e) => Some(Err(Error::Messages(e.kind()))),
            },
        }
    }

    async fn ack(&self, delivery: &NatsDelivery) -> Result<(), Error> {
        delivery.settle(AckKind::Ack).await
    }

    async fn nak(&self, delivery: &NatsDelivery, delay: Option<Duration>) -> Result<(), Error> {
        delivery.settle(AckKind::Nak(delay)).await
    }

    async fn term(&self, delivery: &NatsDelivery) -> Result<(), Error> {
        delivery.settle(AckKind::Term).await
    }

    async fn drain(&self) -> Result<(), Error> {
        // pull consumers hold no server-side interest; stop pulling and let
        // unacknowledged messages be redelivered after ack wait
        self.drain_token.cancel();

        debug!(consumer = %self.consumer_name, "subscription drained");

        Ok(())
    }
}
