use std::time::Duration;

/// Default window in which the backend collapses publishes with the same message id.
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(120);

/// How long messages are retained by a stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Messages are kept until a limit (age, count, size) is reached.
    #[default]
    Limits,

    /// Messages are kept while there are consumers that have not acknowledged them.
    Interest,

    /// Messages are removed once acknowledged by any consumer.
    WorkQueue,
}

/// Where a stream stores its messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageType {
    /// Persisted to disk.
    #[default]
    File,

    /// Held in memory only.
    Memory,
}

/// Configuration used to ensure a stream exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// The name of the stream, e.g. `ORDERS`.
    pub name: String,

    /// Subjects captured by the stream.
    pub subjects: Vec<String>,

    /// Retention policy.
    pub retention: RetentionPolicy,

    /// Storage backend.
    pub storage: StorageType,

    /// Window used for deduplication by message id.
    pub duplicate_window: Duration,

    /// Number of replicas.
    pub num_replicas: usize,
}

impl StreamConfig {
    /// Creates the default configuration for `name`, capturing every subject
    /// below `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();

        Self {
            subjects: vec![format!("{name}.>")],
            name,
            retention: RetentionPolicy::default(),
            storage: StorageType::default(),
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            num_replicas: 1,
        }
    }
}

/// Description of an existing stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// The name of the stream.
    pub name: String,

    /// Subjects captured by the stream.
    pub subjects: Vec<String>,

    /// Number of messages currently stored.
    pub messages: u64,

    /// Sequence of the last stored message.
    pub last_sequence: u64,
}

/// Acknowledgement of a publish by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishAck {
    /// The stream that stored the message.
    pub stream: String,

    /// Sequence assigned to the message (or to the original, for duplicates).
    pub sequence: u64,

    /// Whether the backend discarded the message as a duplicate.
    pub duplicate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_captures_all_descendants() {
        let config = StreamConfig::new("ORDERS");

        assert_eq!(config.name, "ORDERS");
        assert_eq!(config.subjects, vec!["ORDERS.>".to_string()]);
        assert_eq!(config.duplicate_window, DEFAULT_DUPLICATE_WINDOW);
        assert_eq!(config.num_replicas, 1);
    }
}
