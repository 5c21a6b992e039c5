use crate::Error;
use crate::backend::{ConsumerKey, MemoryBackend};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vnats_bridge::{Delivery, Message, RawSubscription};

/// A message handed out by a [`MemorySubscription`].
#[derive(Clone, Debug)]
pub struct MemoryDelivery {
    message: Message,
}

impl Delivery for MemoryDelivery {
    fn message(&self) -> &Message {
        &self.message
    }
}

/// A pull subscription on a [`MemoryBackend`] consumer.
#[derive(Debug)]
pub struct MemorySubscription {
    backend: MemoryBackend,
    drained: Arc<AtomicBool>,
    key: ConsumerKey,
}

impl MemorySubscription {
    pub(crate) const fn new(
        backend: MemoryBackend,
        key: ConsumerKey,
        drained: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backend,
            drained,
            key,
        }
    }

    /// The consumer the subscription is bound to.
    #[must_use]
    pub fn consumer_name(&self) -> &str {
        &self.key.consumer
    }

    /// Whether the subscription has been drained.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RawSubscription for MemorySubscription {
    type Error = Error;

    type Delivery = MemoryDelivery;

    async fn next(&self) -> Option<Result<MemoryDelivery, Error>> {
        let message = self.backend.pull(&self.key, &self.drained).await?;

        Some(Ok(MemoryDelivery { message }))
    }

    async fn ack(&self, delivery: &MemoryDelivery) -> Result<(), Error> {
        self.backend
            .ack(&self.key, delivery.message.stream_sequence)
            .await
    }

    async fn nak(&self, delivery: &MemoryDelivery, delay: Option<Duration>) -> Result<(), Error> {
        self.backend
            .nak(&self.key, delivery.message.stream_sequence, delay)
            .await
    }

    async fn term(&self, delivery: &MemoryDelivery) -> Result<(), Error> {
        self.backend
            .term(&self.key, delivery.message.stream_sequence)
            .await
    }

    async fn drain(&self) -> Result<(), Error> {
        self.backend.drain_subscription(&self.key.consumer).await?;

        self.drained.store(true, Ordering::Release);
        self.backend.wake();

        debug!(stream = %self.key.stream, consumer = %self.key.consumer, "subscription drained");

        Ok(())
    }
}
