use std::time::Duration;

use vnats_bridge::{LogLevel, Logger, SubscriptionMode};

/// Arguments for [`Connection::new_publisher`](crate::Connection::new_publisher).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatePublisherArgs {
    /// The stream to publish into, e.g. `ORDERS`.
    pub stream_name: String,
}

impl CreatePublisherArgs {
    /// Creates arguments for a publisher on `stream_name`.
    #[must_use]
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
        }
    }
}

/// Arguments for [`Connection::new_subscriber`](crate::Connection::new_subscriber).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateSubscriberArgs {
    /// The durable consumer to pull through.
    pub consumer_name: String,

    /// The subject filter: exact (`ORDERS.new`), one level (`ORDERS.*`) or
    /// all descendants (`ORDERS.>`). The first token names the stream.
    pub subject: String,

    /// Ordering and concurrency regime.
    pub mode: SubscriptionMode,

    /// What to do when the handler reports a recoverable failure.
    pub retry: RetryPolicy,
}

impl CreateSubscriberArgs {
    /// Creates arguments with the default mode and retry policy.
    #[must_use]
    pub fn new(consumer_name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            subject: subject.into(),
            mode: SubscriptionMode::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the subscription mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SubscriptionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Delay before a negatively acknowledged message is redelivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Redeliver as soon as the backend allows.
    #[default]
    None,

    /// Wait the same duration before every redelivery.
    Fixed(Duration),

    /// Double the delay on every delivery, starting at `base`, capped at `max`.
    Exponential {
        /// Delay after the first delivery.
        base: Duration,

        /// Upper bound on the delay.
        max: Duration,
    },
}

impl Backoff {
    /// The delay to request after delivery attempt `delivered` (1-based) failed.
    #[must_use]
    pub fn delay(self, delivered: u64) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed(delay) => Some(delay),
            Self::Exponential { base, max } => {
                let exponent = u32::try_from(delivered.saturating_sub(1))
                    .unwrap_or(u32::MAX)
                    .min(31);

                Some(
                    base.checked_mul(1 << exponent)
                        .map_or(max, |delay| delay.min(max)),
                )
            }
        }
    }
}

/// Bound and pacing of redeliveries after recoverable handler failures.
///
/// The default retries forever without delay, leaving pacing to the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries after which a recoverable failure terminates the message.
    /// Retries forever if not set.
    pub max_deliveries: Option<u64>,

    /// Delay requested with each redelivery.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retries forever without delay.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_deliveries: None,
            backoff: Backoff::None,
        }
    }

    /// Terminates a message once it has failed `max_deliveries` times.
    #[must_use]
    pub const fn bounded(max_deliveries: u64) -> Self {
        Self {
            max_deliveries: Some(max_deliveries),
            backoff: Backoff::None,
        }
    }

    /// Sets the backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether a message on its `delivered`-th attempt may not be retried again.
    #[must_use]
    pub fn is_exhausted(&self, delivered: u64) -> bool {
        self.max_deliveries.is_some_and(|max| delivered >= max)
    }
}

/// Options applied when connecting, before the bridge is created.
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub(crate) logger: Logger,
}

impl ConnectOptions {
    /// Routes log records to `log_fn`.
    #[must_use]
    pub fn with_logger<F>(mut self, log_fn: F) -> Self
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        self.logger = Logger::new(log_fn);
        self
    }

    /// Uses an already constructed logger, e.g. [`Logger::tracing`].
    #[must_use]
    pub fn with_logger_instance(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}
