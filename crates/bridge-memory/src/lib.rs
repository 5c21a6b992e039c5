//! In-memory (single process) implementation of the bridge for tests and local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod backend;
mod error;
mod subscription;

pub use backend::{BackendEvent, DEFAULT_ADDRESS, MemoryBackend, StoredMessage};
pub use error::Error;
pub use subscription::{MemoryDelivery, MemorySubscription};

use backend::ConsumerKey;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info};
use vnats_bridge::subject;
use vnats_bridge::{Bridge, Logger, PublishAck, StreamConfig, StreamInfo, SubscriptionMode};

/// A connection to a [`MemoryBackend`].
#[derive(Clone, Debug)]
pub struct MemoryBridge {
    backend: MemoryBackend,
    drained: Arc<AtomicBool>,
    logger: Logger,
    servers: Vec<String>,
    subscriptions: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl MemoryBridge {
    /// The backend this bridge is connected to.
    #[must_use]
    pub const fn backend(&self) -> &MemoryBackend {
        &self.backend
    }

    /// Whether the bridge has been drained.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.is_drained() {
            return Err(Error::Drained);
        }

        Ok(())
    }
}

#[async_trait]
impl Bridge for MemoryBridge {
    type Error = Error;

    type Options = MemoryBackend;

    type Subscription = MemorySubscription;

    async fn connect(
        servers: &[String],
        backend: MemoryBackend,
        logger: Logger,
    ) -> Result<Self, Error> {
        if servers.is_empty() {
            return Err(Error::NoServers);
        }

        if backend.is_offline().await || !servers.iter().any(|s| s == backend.address()) {
            return Err(Error::Unreachable(servers.join(", ")));
        }

        logger.debug(format_args!("Connected to {}", backend.address()));
        info!(address = %backend.address(), "connected to memory backend");

        Ok(Self {
            backend,
            drained: Arc::new(AtomicBool::new(false)),
            logger,
            servers: servers.to_vec(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Error> {
        self.check_open()?;

        let info = self.backend.ensure_stream(config).await?;
        debug!(stream = %info.name, "stream ensured");

        Ok(info)
    }

    async fn create_subscription(
        &self,
        subject: &str,
        consumer_name: &str,
        mode: SubscriptionMode,
    ) -> Result<MemorySubscription, Error> {
        self.check_open()?;

        let key = ConsumerKey {
            stream: subject::stream_name(subject)?.to_string(),
            consumer: consumer_name.to_string(),
        };

        self.backend.ensure_consumer(&key, subject, mode).await?;

        let drained = Arc::new(AtomicBool::new(false));
        self.subscriptions.lock().await.push(drained.clone());

        self.logger.debug(format_args!(
            "Subscribed to {subject} through consumer {consumer_name} ({mode})"
        ));

        Ok(MemorySubscription::new(self.backend.clone(), key, drained))
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

        self.backend.publish(subject, payload, dedup_key).await
    }

    async fn drain(&self) -> Result<(), Error> {
        self.check_open()?;

        self.backend.drain_connection().await?;
        self.drained.store(true, Ordering::Release);

        for subscription in self.subscriptions.lock().await.iter() {
            subscription.store(true, Ordering::Release);
        }
        self.backend.wake();

        info!(address = %self.backend.address(), "memory bridge drained");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use assert_matches::assert_matches;
    use tokio::time::timeout;
    use vnats_bridge::{Delivery, RawSubscription};

    async fn connect(backend: &MemoryBackend) -> MemoryBridge {
        MemoryBridge::connect(
            &[backend.address().to_string()],
            backend.clone(),
            Logger::noop(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_connect_requires_reachable_server() {
        let backend = MemoryBackend::new();

        let result =
            MemoryBridge::connect(&["memory://elsewhere".to_string()], backend.clone(), Logger::noop())
                .await;
        assert_matches!(result, Err(Error::Unreachable(_)));

        let result = MemoryBridge::connect(&[], backend.clone(), Logger::noop()).await;
        assert_matches!(result, Err(Error::NoServers));

        backend.set_offline(true).await;
        let result = MemoryBridge::connect(
            &[backend.address().to_string()],
            backend.clone(),
            Logger::noop(),
        )
        .await;
        assert_matches!(result, Err(Error::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_servers_preserve_order() {
        let backend = MemoryBackend::new();
        let servers = vec!["memory://first".to_string(), backend.address().to_string()];

        let bridge = MemoryBridge::connect(&servers, backend, Logger::noop())
            .await
            .unwrap();

        assert_eq!(bridge.servers(), servers);
    }

    #[tokio::test]
    async fn test_subscription_receives_published_message() {
        let backend = MemoryBackend::new();
        let bridge = connect(&backend).await;

        bridge.ensure_stream(StreamConfig::new("ORDERS")).await.unwrap();
        let subscription = bridge
            .create_subscription("ORDERS.new", "svc", SubscriptionMode::default())
            .await
            .unwrap();

        bridge
            .publish("ORDERS.new", Bytes::from("hello"), "evt-1")
            .await
            .unwrap();

        let delivery = timeout(Duration::from_secs(1), subscription.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(delivery.message().payload, Bytes::from("hello"));
        subscription.ack(&delivery).await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_wakes_pending_next() {
        let backend = MemoryBackend::new();
        let bridge = connect(&backend).await;

        bridge.ensure_stream(StreamConfig::new("ORDERS")).await.unwrap();
        let subscription = Arc::new(
            bridge
                .create_subscription("ORDERS.>", "svc", SubscriptionMode::default())
                .await
                .unwrap(),
        );

        let waiting = tokio::spawn({
            let subscription = subscription.clone();
            async move { subscription.next().await.is_none() }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        subscription.drain().await.unwrap();

        assert!(timeout(Duration::from_secs(1), waiting).await.unwrap().unwrap());
        assert!(subscription.is_drained());
    }

    #[tokio::test]
    async fn test_publish_after_drain_fails() {
        let backend = MemoryBackend::new();
        let bridge = connect(&backend).await;

        bridge.ensure_stream(StreamConfig::new("ORDERS")).await.unwrap();
        bridge.drain().await.unwrap();

        assert_matches!(
            bridge.publish("ORDERS.new", Bytes::from("late"), "evt-9").await,
            Err(Error::Drained)
        );
        assert_eq!(backend.events().await.last(), Some(&BackendEvent::BridgeDrained));
    }

    #[tokio::test]
    async fn test_bridge_drain_closes_subscriptions() {
        let backend = MemoryBackend::new();
        let bridge = connect(&backend).await;

        bridge.ensure_stream(StreamConfig::new("ORDERS")).await.unwrap();
        let subscription = bridge
            .create_subscription("ORDERS.>", "svc", SubscriptionMode::default())
            .await
            .unwrap();

        bridge.drain().await.unwrap();

        assert!(subscription.is_drained());
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failing_subscription_drain() {
        let backend = MemoryBackend::new();
        backend.fail_drain_for("svc").await;
        let bridge = connect(&backend).await;

        bridge.ensure_stream(StreamConfig::new("ORDERS")).await.unwrap();
        let subscription = bridge
            .create_subscription("ORDERS.>", "svc", SubscriptionMode::default())
            .await
            .unwrap();

        assert_matches!(
            subscription.drain().await,
            Err(Error::SubscriptionDrainFailed(consumer)) if consumer == "svc"
        );
        assert!(!subscription.is_drained());
    }
}
