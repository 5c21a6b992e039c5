use crate::Error;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use vnats_bridge::subject;
use vnats_bridge::{BridgeOptions, Message, PublishAck, StreamConfig, StreamInfo, SubscriptionMode};

/// Address the backend answers on unless configured otherwise.
pub const DEFAULT_ADDRESS: &str = "memory://localhost";

/// Something that happened on the backend, recorded in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// A stream was looked up or created.
    StreamEnsured {
        /// The stream name.
        stream: String,
        /// Whether the stream was created by this call.
        created: bool,
    },

    /// A consumer was looked up or created.
    ConsumerEnsured {
        /// The stream name.
        stream: String,
        /// The consumer name.
        consumer: String,
        /// Whether the consumer was created by this call.
        created: bool,
    },

    /// A message was published.
    Published {
        /// The subject published to.
        subject: String,
        /// The deduplication key.
        dedup_key: String,
        /// The sequence of the stored message.
        sequence: u64,
        /// Whether the publish was discarded as a duplicate.
        duplicate: bool,
    },

    /// A message was acknowledged.
    Acked {
        /// The consumer name.
        consumer: String,
        /// The stream sequence.
        sequence: u64,
    },

    /// Redelivery of a message was requested.
    Naked {
        /// The consumer name.
        consumer: String,
        /// The stream sequence.
        sequence: u64,
    },

    /// A message was dropped permanently.
    Terminated {
        /// The consumer name.
        consumer: String,
        /// The stream sequence.
        sequence: u64,
    },

    /// A subscription was drained.
    SubscriptionDrained {
        /// The consumer the subscription was bound to.
        consumer: String,
    },

    /// A connection was drained.
    BridgeDrained,
}

/// A message stored in a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// The stream sequence.
    pub sequence: u64,

    /// The subject published to.
    pub subject: String,

    /// The message body.
    pub payload: Bytes,

    /// The deduplication key supplied on publish.
    pub dedup_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ConsumerKey {
    pub stream: String,
    pub consumer: String,
}

#[derive(Debug)]
struct StreamState {
    config: StreamConfig,
    dedup: HashMap<String, (u64, Instant)>,
    last_sequence: u64,
    messages: Vec<StoredMessage>,
}

impl StreamState {
    fn captures(&self, subject: &str) -> bool {
        self.config
            .subjects
            .iter()
            .any(|filter| subject::matches(filter, subject))
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            name: self.config.name.clone(),
            subjects: self.config.subjects.clone(),
            messages: self.messages.len() as u64,
            last_sequence: self.last_sequence,
        }
    }
}

#[derive(Debug)]
struct ConsumerState {
    deliveries: HashMap<u64, u64>,
    filter: String,
    in_flight: HashSet<u64>,
    mode: SubscriptionMode,
    pending: VecDeque<u64>,
}

impl ConsumerState {
    fn at_capacity(&self) -> bool {
        self.mode
            .max_ack_pending()
            .and_then(|max| usize::try_from(max).ok())
            .is_some_and(|max| self.in_flight.len() >= max)
    }
}

#[derive(Debug, Default)]
struct State {
    consumers: HashMap<ConsumerKey, ConsumerState>,
    events: Vec<BackendEvent>,
    fail_bridge_drain: bool,
    failing_drains: HashSet<String>,
    offline: bool,
    rejected_streams: HashSet<String>,
    streams: HashMap<String, StreamState>,
}

impl State {
    fn take_next(&mut self, key: &ConsumerKey) -> Option<Message> {
        let Self {
            consumers, streams, ..
        } = self;

        let consumer = consumers.get_mut(key)?;
        if consumer.at_capacity() {
            return None;
        }

        let stream = streams.get(&key.stream)?;

        while let Some(sequence) = consumer.pending.pop_front() {
            let Some(stored) = stream.messages.iter().find(|m| m.sequence == sequence) else {
                continue;
            };

            let delivered = consumer.deliveries.entry(sequence).or_insert(0);
            *delivered += 1;
            consumer.in_flight.insert(sequence);

            return Some(Message {
                subject: stored.subject.clone(),
                payload: stored.payload.clone(),
                headers: None,
                stream_sequence: sequence,
                delivered: *delivered,
            });
        }

        None
    }

    fn settle(&mut self, key: &ConsumerKey, sequence: u64) -> Result<&mut ConsumerState, Error> {
        let consumer = self
            .consumers
            .get_mut(key)
            .filter(|consumer| consumer.in_flight.contains(&sequence))
            .ok_or_else(|| Error::NotPending {
                consumer: key.consumer.clone(),
                sequence,
            })?;

        Ok(consumer)
    }
}

/// A single fake server shared by every bridge connected to it.
///
/// Streams deduplicate publishes by message id within their duplicate
/// window. Consumers are durable: subscriptions bound to the same consumer
/// share its queue. Strict-order consumers hand out at most one
/// unacknowledged message; a negatively acknowledged message is requeued at
/// the front for strict consumers and at the back otherwise.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    address: String,
    notify: Arc<Notify>,
    state: Arc<Mutex<State>>,
}

impl BridgeOptions for MemoryBackend {}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a backend answering on [`DEFAULT_ADDRESS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_address(DEFAULT_ADDRESS)
    }

    /// Creates a backend answering on `address`.
    #[must_use]
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            notify: Arc::new(Notify::new()),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// The address bridges must list to reach this backend.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Makes the backend unreachable (or reachable again).
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Makes every future attempt to create the stream `name` fail.
    pub async fn reject_stream(&self, name: impl Into<String>) {
        self.state.lock().await.rejected_streams.insert(name.into());
    }

    /// Makes draining any subscription bound to `consumer` fail.
    pub async fn fail_drain_for(&self, consumer: impl Into<String>) {
        self.state.lock().await.failing_drains.insert(consumer.into());
    }

    /// Makes draining connections fail.
    pub async fn fail_bridge_drain(&self) {
        self.state.lock().await.fail_bridge_drain = true;
    }

    /// Every event recorded so far, in order.
    pub async fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().await.events.clone()
    }

    /// The messages stored in `stream`, in sequence order.
    pub async fn stored_messages(&self, stream: &str) -> Vec<StoredMessage> {
        self.state
            .lock()
            .await
            .streams
            .get(stream)
            .map(|stream| stream.messages.clone())
            .unwrap_or_default()
    }

    pub(crate) async fn is_offline(&self) -> bool {
        self.state.lock().await.offline
    }

    pub(crate) fn wake(&self) {
        self.notify.notify_waiters();
    }

    pub(crate) async fn ensure_stream(&self, config: StreamConfig) -> Result<StreamInfo, Error> {
        let mut state = self.state.lock().await;

        if state.offline {
            return Err(Error::Unavailable);
        }

        if state.rejected_streams.contains(&config.name) {
            return Err(Error::StreamRejected(config.name));
        }

        let name = config.name.clone();
        let created = !state.streams.contains_key(&name);

        if created {
            if let Some(existing) = state.streams.values().find(|existing| {
                config.subjects.iter().any(|filter| {
                    existing
                        .config
                        .subjects
                        .iter()
                        .any(|other| subjects_overlap(filter, other))
                })
            }) {
                return Err(Error::SubjectOverlap {
                    stream: name,
                    existing: existing.config.name.clone(),
                });
            }

            state.streams.insert(
                name.clone(),
                StreamState {
                    config,
                    dedup: HashMap::new(),
                    last_sequence: 0,
                    messages: Vec::new(),
                },
            );
        }

        state.events.push(BackendEvent::StreamEnsured {
            stream: name.clone(),
            created,
        });

        state
            .streams
            .get(&name)
            .map(StreamState::info)
            .ok_or(Error::StreamNotFound(name))
    }

    pub(crate) async fn ensure_consumer(
        &self,
        key: &ConsumerKey,
        filter: &str,
        mode: SubscriptionMode,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if state.offline {
            return Err(Error::Unavailable);
        }

        let State {
            consumers,
            events,
            streams,
            ..
        } = &mut *state;

        let stream = streams
            .get(&key.stream)
            .ok_or_else(|| Error::StreamNotFound(key.stream.clone()))?;

        let created = match consumers.get(key) {
            Some(existing) if existing.filter != filter || existing.mode != mode => {
                return Err(Error::ConsumerConflict {
                    stream: key.stream.clone(),
                    consumer: key.consumer.clone(),
                });
            }
            Some(_) => false,
            None => {
                let pending = stream
                    .messages
                    .iter()
                    .filter(|stored| subject::matches(filter, &stored.subject))
                    .map(|stored| stored.sequence)
                    .collect();

                consumers.insert(
                    key.clone(),
                    ConsumerState {
                        deliveries: HashMap::new(),
                        filter: filter.to_string(),
                        in_flight: HashSet::new(),
                        mode,
                        pending,
                    },
                );

                true
            }
        };

        events.push(BackendEvent::ConsumerEnsured {
            stream: key.stream.clone(),
            consumer: key.consumer.clone(),
            created,
        });

        Ok(())
    }

    pub(crate) async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        dedup_key: &str,
    ) -> Result<PublishAck, Error> {
        subject::validate_concrete(subject)?;

        let mut state = self.state.lock().await;

        if state.offline {
            return Err(Error::Unavailable);
        }

        let State {
            consumers,
            events,
            streams,
            ..
        } = &mut *state;

        let (name, stream) = streams
            .iter_mut()
            .find(|(_, stream)| stream.captures(subject))
            .ok_or_else(|| Error::NoStreamForSubject(subject.to_string()))?;

        let now = Instant::now();
        let window = stream.config.duplicate_window;
        stream
            .dedup
            .retain(|_, (_, published_at)| now.duration_since(*published_at) < window);

        if let Some((sequence, _)) = stream.dedup.get(dedup_key) {
            events.push(BackendEvent::Published {
                subject: subject.to_string(),
                dedup_key: dedup_key.to_string(),
                sequence: *sequence,
                duplicate: true,
            });

            return Ok(PublishAck {
                stream: name.clone(),
                sequence: *sequence,
                duplicate: true,
            });
        }

        stream.last_sequence += 1;
        let sequence = stream.last_sequence;

        stream.messages.push(StoredMessage {
            sequence,
            subject: subject.to_string(),
            payload,
            dedup_key: dedup_key.to_string(),
        });

        // JetStream ignores empty message ids
        if !dedup_key.is_empty() {
            stream.dedup.insert(dedup_key.to_string(), (sequence, now));
        }

        for (key, consumer) in consumers.iter_mut() {
            if key.stream == *name && subject::matches(&consumer.filter, subject) {
                consumer.pending.push_back(sequence);
            }
        }

        events.push(BackendEvent::Published {
            subject: subject.to_string(),
            dedup_key: dedup_key.to_string(),
            sequence,
            duplicate: false,
        });

        let ack = PublishAck {
            stream: name.clone(),
            sequence,
            duplicate: false,
        };

        drop(state);
        self.wake();

        Ok(ack)
    }

    pub(crate) async fn pull(&self, key: &ConsumerKey, drained: &AtomicBool) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if drained.load(Ordering::Acquire) {
                return None;
            }

            if let Some(message) = self.state.lock().await.take_next(key) {
                return Some(message);
            }

            notified.await;
        }
    }

    pub(crate) async fn ack(&self, key: &ConsumerKey, sequence: u64) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        state.settle(key, sequence)?.in_flight.remove(&sequence);
        state.events.push(BackendEvent::Acked {
            consumer: key.consumer.clone(),
            sequence,
        });

        drop(state);
        self.wake();

        Ok(())
    }

    pub(crate) async fn term(&self, key: &ConsumerKey, sequence: u64) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        state.settle(key, sequence)?.in_flight.remove(&sequence);
        state.events.push(BackendEvent::Terminated {
            consumer: key.consumer.clone(),
            sequence,
        });

        drop(state);
        self.wake();

        Ok(())
    }

    pub(crate) async fn nak(
        &self,
        key: &ConsumerKey,
        sequence: u64,
        delay: Option<Duration>,
    ) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;

            state.settle(key, sequence)?;
            state.events.push(BackendEvent::Naked {
                consumer: key.consumer.clone(),
                sequence,
            });
        }

        match delay {
            Some(delay) if !delay.is_zero() => {
                // the message keeps its pending slot until the delay elapses
                let backend = self.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    backend.requeue(&key, sequence).await;
                });
            }
            _ => self.requeue(key, sequence).await,
        }

        Ok(())
    }

    async fn requeue(&self, key: &ConsumerKey, sequence: u64) {
        let mut state = self.state.lock().await;

        if let Some(consumer) = state.consumers.get_mut(key) {
            if consumer.in_flight.remove(&sequence) {
                if consumer.mode.is_strict() {
                    consumer.pending.push_front(sequence);
                } else {
                    consumer.pending.push_back(sequence);
                }
            }
        }

        drop(state);
        self.wake();
    }

    pub(crate) async fn drain_subscription(&self, consumer: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if state.failing_drains.contains(consumer) {
            return Err(Error::SubscriptionDrainFailed(consumer.to_string()));
        }

        state.events.push(BackendEvent::SubscriptionDrained {
            consumer: consumer.to_string(),
        });

        Ok(())
    }

    pub(crate) async fn drain_connection(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if state.fail_bridge_drain {
            return Err(Error::DrainFailed);
        }

        state.events.push(BackendEvent::BridgeDrained);

        Ok(())
    }
}

fn subjects_overlap(a: &str, b: &str) -> bool {
    let mut a_tokens = a.split('.');
    let mut b_tokens = b.split('.');

    loop {
        match (a_tokens.next(), b_tokens.next()) {
            (Some(subject::WILDCARD_ALL), Some(_)) | (Some(_), Some(subject::WILDCARD_ALL)) => {
                return true;
            }
            (Some(x), Some(y)) if x == y || x == subject::WILDCARD_ONE || y == subject::WILDCARD_ONE => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
