use crate::handler::{HandlerError, MessageHandler};
use crate::options::{Backoff, CreateSubscriberArgs, RetryPolicy};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use vnats_bridge::{Delivery, Logger, RawSubscription, SubscriptionMode};

/// Pause after consecutive failed pulls, reset by the next delivery.
const PULL_RETRY_BACKOFF: Backoff = Backoff::Exponential {
    base: Duration::from_millis(10),
    max: Duration::from_secs(1),
};

/// A registered subscription and its delivery task.
///
/// The raw subscription is shared only with the subscriber's own delivery
/// loop, so the connection can drain it while the loop is suspended in
/// `next`.
pub(crate) struct Subscriber<S>
where
    S: RawSubscription,
{
    consumer_name: String,
    quit: CancellationToken,
    raw: Arc<S>,
    subject: String,
    task: JoinHandle<()>,
}

impl<S> Subscriber<S>
where
    S: RawSubscription,
{
    /// Starts the delivery loop for `raw` on its own task.
    pub(crate) fn spawn<H>(args: CreateSubscriberArgs, raw: S, handler: H, logger: Logger) -> Self
    where
        H: MessageHandler,
    {
        let raw = Arc::new(raw);
        let quit = CancellationToken::new();

        let delivery_loop = DeliveryLoop {
            consumer_name: args.consumer_name.clone(),
            handler,
            logger,
            mode: args.mode,
            quit: quit.clone(),
            raw: raw.clone(),
            retry: args.retry,
            subject: args.subject.clone(),
        };

        Self {
            consumer_name: args.consumer_name,
            quit,
            raw,
            subject: args.subject,
            task: tokio::spawn(delivery_loop.run()),
        }
    }

    pub(crate) fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }

    /// Drains the raw subscription, then signals quit and waits for the
    /// delivery loop to finish its in-flight message.
    ///
    /// Quit is not signalled if draining fails.
    pub(crate) async fn close(self, logger: &Logger) -> Result<(), S::Error> {
        self.raw.drain().await?;

        self.quit.cancel();

        if let Err(e) = self.task.await {
            logger.error(format_args!(
                "Delivery loop for {} on {} ended abnormally: {e}",
                self.consumer_name, self.subject
            ));
        }

        Ok(())
    }
}

/// Outcome of handling one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settlement {
    Ack,
    Nak,
    Term,
}

struct DeliveryLoop<S, H>
where
    S: RawSubscription,
    H: MessageHandler,
{
    consumer_name: String,
    handler: H,
    logger: Logger,
    mode: SubscriptionMode,
    quit: CancellationToken,
    raw: Arc<S>,
    retry: RetryPolicy,
    subject: String,
}

impl<S, H> DeliveryLoop<S, H>
where
    S: RawSubscription,
    H: MessageHandler,
{
    #[instrument(skip_all, fields(consumer = %self.consumer_name, subject = %self.subject, mode = %self.mode))]
    async fn run(self) {
        // strict mode only: the sequence that must come back before anything else
        let mut awaiting_redelivery = None;
        let mut pull_failures = 0_u64;

        loop {
            let next = tokio::select! {
                biased;
                () = self.quit.cancelled() => break,
                next = self.raw.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => {
                    pull_failures = 0;
                    delivery
                }
                Some(Err(e)) => {
                    pull_failures = pull_failures.saturating_add(1);
                    let delay = PULL_RETRY_BACKOFF.delay(pull_failures).unwrap_or_default();

                    self.logger.warn(format_args!(
                        "Failed to pull from {} on {} (attempt {pull_failures}, retrying in {delay:?}): {e}",
                        self.consumer_name, self.subject
                    ));

                    tokio::select! {
                        biased;
                        () = self.quit.cancelled() => break,
                        () = tokio::time::sleep(delay) => continue,
                    }
                }
                None => break,
            };

            if let Some(expected) = awaiting_redelivery.take() {
                let sequence = delivery.message().stream_sequence;
                if sequence != expected {
                    self.logger.warn(format_args!(
                        "Expected redelivery of message {expected} on {} but received {sequence}",
                        self.subject
                    ));
                }
            }

            if self.process(&delivery).await == Settlement::Nak && self.mode.is_strict() {
                awaiting_redelivery = Some(delivery.message().stream_sequence);
            }
        }

        self.logger.trace(format_args!(
            "Delivery loop for {} on {} stopped",
            self.consumer_name, self.subject
        ));
    }

    async fn process(&self, delivery: &S::Delivery) -> Settlement {
        let message = delivery.message();
        let sequence = message.stream_sequence;
        let delivered = message.delivered;

        let (settlement, result) = match self.handler.handle(message.clone()).await {
            Ok(()) => (Settlement::Ack, self.raw.ack(delivery).await),
            Err(HandlerError::Terminal(e)) => {
                self.logger.error(format_args!(
                    "Terminating message {sequence} on {}: {e}",
                    self.subject
                ));

                (Settlement::Term, self.raw.term(delivery).await)
            }
            Err(HandlerError::Recoverable(e)) if self.retry.is_exhausted(delivered) => {
                self.logger.error(format_args!(
                    "Terminating message {sequence} on {} after {delivered} deliveries: {e}",
                    self.subject
                ));

                (Settlement::Term, self.raw.term(delivery).await)
            }
            Err(HandlerError::Recoverable(e)) => {
                let delay = self.retry.backoff.delay(delivered);

                self.logger.debug(format_args!(
                    "Requesting redelivery of message {sequence} on {} (delivery {delivered}, delay {delay:?}): {e}",
                    self.subject
                ));

                (Settlement::Nak, self.raw.nak(delivery, delay).await)
            }
        };

        // the backend redelivers anything left unsettled once its ack wait expires
        if let Err(e) = result {
            self.logger.warn(format_args!(
                "Failed to {settlement:?} message {sequence} on {}: {e}",
                self.subject
            ));
        }

        settlement
    }
}
