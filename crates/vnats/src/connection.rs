use crate::error::{Error, SubscriptionCreateError};
use crate::handler::MessageHandler;
use crate::options::{ConnectOptions, CreatePublisherArgs, CreateSubscriberArgs};
use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;
use vnats_bridge::subject;
use vnats_bridge::{Bridge, Logger, StreamConfig};

/// A session with the backend and the subscribers created through it.
///
/// The bridge is shared with every [`Publisher`] created from the connection
/// but only ever drained by [`Connection::close`]. Closing consumes the
/// connection, so nothing can be created from it afterwards and it cannot be
/// closed twice.
pub struct Connection<B>
where
    B: Bridge,
{
    bridge: Arc<B>,
    logger: Logger,
    subscribers: Mutex<Vec<Subscriber<B::Subscription>>>,
}

impl<B> Debug for Connection<B>
where
    B: Bridge,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Connection")
            .field("servers", &self.bridge.servers())
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl<B> Connection<B>
where
    B: Bridge,
{
    /// Connects to the first reachable server in `servers`.
    ///
    /// `options` are applied before the bridge is created, so the injected
    /// logger already sees connection setup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the bridge cannot establish a session.
    pub async fn connect(
        servers: &[String],
        bridge_options: B::Options,
        options: ConnectOptions,
    ) -> Result<Self, Error<B::Error>> {
        let logger = options.logger;

        logger.trace(format_args!("Connecting to {}...", servers.join(", ")));

        let bridge = B::connect(servers, bridge_options, logger.clone())
            .await
            .map_err(|e| {
                logger.error(format_args!("Failed to connect: {e}"));
                Error::Connect(e)
            })?;

        logger.info(format_args!("Connected to {}.", bridge.servers().join(", ")));

        Ok(Self {
            bridge: Arc::new(bridge),
            logger,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// The bridge this connection talks through.
    #[must_use]
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Ordered list of known server addresses.
    #[must_use]
    pub fn servers(&self) -> Vec<String> {
        self.bridge.servers()
    }

    /// Number of subscribers registered on this connection.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Creates a publisher for `args.stream_name`, creating the stream if it
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSubject`] if the stream name is not a single
    /// concrete token and [`Error::StreamProvision`] if the backend rejects
    /// the stream.
    pub async fn new_publisher(
        &self,
        args: CreatePublisherArgs,
    ) -> Result<Publisher<B>, Error<B::Error>> {
        subject::validate_stream_name(&args.stream_name)?;

        let info = self
            .bridge
            .ensure_stream(StreamConfig::new(args.stream_name.clone()))
            .await
            .map_err(|source| Error::StreamProvision {
                stream: args.stream_name.clone(),
                source,
            })?;

        self.logger.debug(format_args!(
            "Created publisher for stream {} ({} messages)",
            info.name, info.messages
        ));

        Ok(Publisher::new(
            self.bridge.clone(),
            self.logger.clone(),
            args.stream_name,
        ))
    }

    /// Subscribes `handler` to `args.subject` through the durable consumer
    /// `args.consumer_name` and starts delivering messages to it.
    ///
    /// The first token of the subject names the stream, which is created if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubscriptionCreate`] if the subject is malformed or
    /// starts with a wildcard, or if the backend cannot provide the stream or
    /// the subscription. The backend is not contacted for a bad subject.
    pub async fn new_subscriber<H>(
        &self,
        args: CreateSubscriberArgs,
        handler: H,
    ) -> Result<(), Error<B::Error>>
    where
        H: MessageHandler,
    {
        let subscription_error = |source| Error::SubscriptionCreate {
            subject: args.subject.clone(),
            consumer: args.consumer_name.clone(),
            source,
        };

        let stream_name = subject::stream_name(&args.subject)
            .map_err(|e| subscription_error(SubscriptionCreateError::InvalidSubject(e)))?;

        self.bridge
            .ensure_stream(StreamConfig::new(stream_name))
            .await
            .map_err(|e| subscription_error(SubscriptionCreateError::Bridge(e)))?;

        let raw = self
            .bridge
            .create_subscription(&args.subject, &args.consumer_name, args.mode)
            .await
            .map_err(|e| subscription_error(SubscriptionCreateError::Bridge(e)))?;

        self.logger.debug(format_args!(
            "Subscribed {} to {} ({})",
            args.consumer_name, args.subject, args.mode
        ));

        let subscriber = Subscriber::spawn(args, raw, handler, self.logger.clone());
        self.subscribers.lock().await.push(subscriber);

        Ok(())
    }

    /// Drains every subscriber in the order they were created, then drains
    /// the bridge.
    ///
    /// Each subscriber stops pulling, lets its in-flight message finish and
    /// is then told to quit. Once `close` returns successfully no handler is
    /// invoked again and publishers created from this connection fail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Drain`] with the first failure. A failing subscriber
    /// drain stops the remaining subscribers from being drained and the
    /// bridge drain is skipped.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<(), Error<B::Error>> {
        let subscribers = self.subscribers.into_inner();

        self.logger
            .trace(format_args!("Draining and closing open subscriptions.."));

        for subscriber in subscribers {
            let consumer_name = subscriber.consumer_name().to_string();
            let subject = subscriber.subject().to_string();

            subscriber.close(&self.logger).await.map_err(|e| {
                self.logger.error(format_args!(
                    "Failed to drain {consumer_name} on {subject}: {e}"
                ));
                Error::Drain(e)
            })?;
        }

        self.logger
            .trace(format_args!("Closed all open subscriptions."));
        self.logger.trace(format_args!("Closing connection..."));

        self.bridge.drain().await.map_err(|e| {
            self.logger
                .error(format_args!("Failed to drain connection: {e}"));
            Error::Drain(e)
        })?;

        self.logger.info(format_args!("Connection closed."));

        Ok(())
    }
}

/// A connection over NATS `JetStream`.
#[cfg(feature = "nats")]
pub type NatsConnection = Connection<vnats_bridge_nats::NatsBridge>;
