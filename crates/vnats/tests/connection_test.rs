//! Connection lifecycle, publishing and shutdown against the in-memory bridge.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use tokio::time::sleep;
use vnats::subject::SubjectError;
use vnats::{
    ConnectOptions, Connection, CreatePublisherArgs, CreateSubscriberArgs, Error, HandlerError,
    LogLevel, Message, SubscriptionCreateError,
};
use vnats_bridge_memory::{BackendEvent, Error as MemoryError, MemoryBackend, MemoryBridge};

type Records = Arc<std::sync::Mutex<Vec<(LogLevel, String)>>>;

async fn connect(backend: &MemoryBackend) -> Connection<MemoryBridge> {
    Connection::connect(
        &[backend.address().to_string()],
        backend.clone(),
        ConnectOptions::default(),
    )
    .await
    .unwrap()
}

async fn connect_recording(backend: &MemoryBackend) -> (Connection<MemoryBridge>, Records) {
    let records: Records = Arc::default();

    let connection = Connection::connect(
        &[backend.address().to_string()],
        backend.clone(),
        ConnectOptions::default().with_logger({
            let records = records.clone();
            move |level, message| records.lock().unwrap().push((level, message.to_string()))
        }),
    )
    .await
    .unwrap();

    (connection, records)
}

fn counting_handler(
    count: &Arc<AtomicUsize>,
) -> impl Fn(Message) -> std::future::Ready<Result<(), HandlerError>> + Send + Sync + 'static {
    let count = count.clone();
    move |_| {
        count.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(()))
    }
}

fn drain_events(events: &[BackendEvent]) -> Vec<BackendEvent> {
    events
        .iter()
        .filter(|event| {
            matches!(
                event,
                BackendEvent::SubscriptionDrained { .. } | BackendEvent::BridgeDrained
            )
        })
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_connect_failures() {
    let backend = MemoryBackend::new();

    let result =
        Connection::<MemoryBridge>::connect(&[], backend.clone(), ConnectOptions::default()).await;
    assert_matches!(result, Err(Error::Connect(MemoryError::NoServers)));

    backend.set_offline(true).await;
    let result = Connection::<MemoryBridge>::connect(
        &[backend.address().to_string()],
        backend.clone(),
        ConnectOptions::default(),
    )
    .await;
    assert_matches!(result, Err(Error::Connect(MemoryError::Unreachable(_))));
}

#[tokio::test]
async fn test_logger_is_active_during_connect() {
    let backend = MemoryBackend::new();
    let (connection, records) = connect_recording(&backend).await;

    assert_eq!(connection.servers(), vec![backend.address().to_string()]);

    let records = records.lock().unwrap();
    assert_eq!(records.first().map(|(level, _)| *level), Some(LogLevel::Trace));
    assert!(records.iter().any(|(level, message)| {
        *level == LogLevel::Debug && message.contains(backend.address())
    }));
}

#[tokio::test]
async fn test_publish_is_deduplicated_by_key() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;

    let publisher = connection
        .new_publisher(CreatePublisherArgs::new("ORDERS"))
        .await
        .unwrap();
    assert_eq!(publisher.stream_name(), "ORDERS");

    publisher
        .publish("ORDERS.new", "payload", "evt-1")
        .await
        .unwrap();
    publisher
        .publish("ORDERS.new", "payload", "evt-1")
        .await
        .unwrap();

    let stored = backend.stored_messages("ORDERS").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].dedup_key, "evt-1");
    assert_eq!(stored[0].payload, Bytes::from("payload"));

    let publishes: Vec<bool> = backend
        .events()
        .await
        .into_iter()
        .filter_map(|event| match event {
            BackendEvent::Published { duplicate, .. } => Some(duplicate),
            _ => None,
        })
        .collect();
    assert_eq!(publishes, vec![false, true]);

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_distinct_keys_are_stored_separately() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;

    let publisher = connection
        .new_publisher(CreatePublisherArgs::new("ORDERS"))
        .await
        .unwrap();
    publisher.publish("ORDERS.new", "payload", "evt-1").await.unwrap();
    publisher.publish("ORDERS.new", "payload", "evt-2").await.unwrap();

    assert_eq!(backend.stored_messages("ORDERS").await.len(), 2);

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_publish_rejects_bad_subjects() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;

    let publisher = connection
        .new_publisher(CreatePublisherArgs::new("ORDERS"))
        .await
        .unwrap();

    assert_matches!(
        publisher.publish("ORDERS.*", "payload", "evt-1").await,
        Err(Error::InvalidSubject(SubjectError::Wildcard(_)))
    );
    assert_matches!(
        publisher.publish("ORDERS..new", "payload", "evt-1").await,
        Err(Error::InvalidSubject(SubjectError::EmptyToken(_)))
    );
    assert_matches!(
        publisher.publish("PRODUCTS.new", "payload", "evt-1").await,
        Err(Error::SubjectNotInStream { stream, .. }) if stream == "ORDERS"
    );
    assert!(backend.stored_messages("ORDERS").await.is_empty());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_malformed_subscription_subject_fails_creation() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    let result = connection
        .new_subscriber(
            CreateSubscriberArgs::new("svc", "ORDERS..new"),
            counting_handler(&count),
        )
        .await;

    assert_matches!(
        result,
        Err(Error::SubscriptionCreate {
            subject,
            source: SubscriptionCreateError::InvalidSubject(SubjectError::EmptyToken(_)),
            ..
        }) if subject == "ORDERS..new"
    );
    assert_eq!(connection.subscriber_count().await, 0);
    assert!(backend.events().await.is_empty());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_subscription_conflict_leaves_connection_usable() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    connection
        .new_subscriber(
            CreateSubscriberArgs::new("svc", "ORDERS.new"),
            counting_handler(&count),
        )
        .await
        .unwrap();

    let result = connection
        .new_subscriber(
            CreateSubscriberArgs::new("svc", "ORDERS.processed"),
            counting_handler(&count),
        )
        .await;
    assert_matches!(
        result,
        Err(Error::SubscriptionCreate {
            consumer,
            source: SubscriptionCreateError::Bridge(MemoryError::ConsumerConflict { .. }),
            ..
        }) if consumer == "svc"
    );
    assert_eq!(connection.subscriber_count().await, 1);

    connection
        .new_subscriber(
            CreateSubscriberArgs::new("audit", "ORDERS.processed"),
            counting_handler(&count),
        )
        .await
        .unwrap();
    assert_eq!(connection.subscriber_count().await, 2);

    connection.close().await.unwrap();
}

#[tokio::test]
async fn test_subscription_fails_when_stream_rejected() {
    let backend = MemoryBackend::new();
    backend.reject_stream("ORDERS").await;
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    let result = connection
        .new_subscriber(
            CreateSubscriberArgs::new("svc", "ORDERS.>"),
            counting_handler(&count),
        )
        .await;

    assert_matches!(
        result,
        Err(Error::SubscriptionCreate {
            source: SubscriptionCreateError::Bridge(MemoryError::StreamRejected(_)),
            ..
        })
    );
    assert_eq!(connection.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_close_drains_every_subscriber_before_bridge() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    for consumer in ["first", "second", "third"] {
        connection
            .new_subscriber(
                CreateSubscriberArgs::new(consumer, format!("ORDERS.{consumer}")),
                counting_handler(&count),
            )
            .await
            .unwrap();
    }

    connection.close().await.unwrap();

    assert_eq!(
        drain_events(&backend.events().await),
        vec![
            BackendEvent::SubscriptionDrained {
                consumer: "first".to_string()
            },
            BackendEvent::SubscriptionDrained {
                consumer: "second".to_string()
            },
            BackendEvent::SubscriptionDrained {
                consumer: "third".to_string()
            },
            BackendEvent::BridgeDrained,
        ]
    );
}

#[tokio::test]
async fn test_failing_subscriber_drain_skips_bridge_drain() {
    let backend = MemoryBackend::new();
    backend.fail_drain_for("second").await;
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    for consumer in ["first", "second"] {
        connection
            .new_subscriber(
                CreateSubscriberArgs::new(consumer, format!("ORDERS.{consumer}")),
                counting_handler(&count),
            )
            .await
            .unwrap();
    }

    assert_matches!(
        connection.close().await,
        Err(Error::Drain(MemoryError::SubscriptionDrainFailed(consumer))) if consumer == "second"
    );

    assert_eq!(
        drain_events(&backend.events().await),
        vec![BackendEvent::SubscriptionDrained {
            consumer: "first".to_string()
        }]
    );
}

#[tokio::test]
async fn test_failing_subscriber_drain_stops_later_drains() {
    let backend = MemoryBackend::new();
    backend.fail_drain_for("first").await;
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    for consumer in ["first", "second"] {
        connection
            .new_subscriber(
                CreateSubscriberArgs::new(consumer, format!("ORDERS.{consumer}")),
                counting_handler(&count),
            )
            .await
            .unwrap();
    }

    assert_matches!(
        connection.close().await,
        Err(Error::Drain(MemoryError::SubscriptionDrainFailed(consumer))) if consumer == "first"
    );
    assert!(drain_events(&backend.events().await).is_empty());
}

#[tokio::test]
async fn test_no_handler_calls_after_close() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    connection
        .new_subscriber(
            CreateSubscriberArgs::new("svc", "ORDERS.>"),
            counting_handler(&count),
        )
        .await
        .unwrap();

    let publisher = connection
        .new_publisher(CreatePublisherArgs::new("ORDERS"))
        .await
        .unwrap();
    for index in 0..5 {
        publisher
            .publish("ORDERS.new", "payload", &format!("evt-{index}"))
            .await
            .unwrap();
    }

    connection.close().await.unwrap();
    let handled = count.load(Ordering::SeqCst);

    // a second session keeps feeding the same durable consumer
    let other = connect(&backend).await;
    let late = other
        .new_publisher(CreatePublisherArgs::new("ORDERS"))
        .await
        .unwrap();
    for index in 5..10 {
        late.publish("ORDERS.new", "payload", &format!("evt-{index}"))
            .await
            .unwrap();
    }
    sleep(Duration::from_millis(50)).await;

    assert_eq!(count.load(Ordering::SeqCst), handled);
    other.close().await.unwrap();
}

#[tokio::test]
async fn test_publish_after_close_fails() {
    let backend = MemoryBackend::new();
    let connection = connect(&backend).await;

    let publisher = connection
        .new_publisher(CreatePublisherArgs::new("ORDERS"))
        .await
        .unwrap();

    connection.close().await.unwrap();

    assert_matches!(
        publisher.publish("ORDERS.new", "payload", "evt-1").await,
        Err(Error::Publish {
            source: MemoryError::Drained,
            ..
        })
    );
    assert!(backend.stored_messages("ORDERS").await.is_empty());
}

#[tokio::test]
async fn test_close_logs_transitions_in_order() {
    let backend = MemoryBackend::new();
    let (connection, records) = connect_recording(&backend).await;
    let count = Arc::new(AtomicUsize::new(0));

    connection
        .new_subscriber(
            CreateSubscriberArgs::new("svc", "ORDERS.>"),
            counting_handler(&count),
        )
        .await
        .unwrap();

    records.lock().unwrap().clear();
    connection.close().await.unwrap();

    let records = records.lock().unwrap();
    let transitions: Vec<(LogLevel, &str)> = records
        .iter()
        .filter(|(_, message)| {
            [
                "Draining and closing open subscriptions..",
                "Closed all open subscriptions.",
                "Closing connection...",
                "Connection closed.",
            ]
            .contains(&message.as_str())
        })
        .map(|(level, message)| (*level, message.as_str()))
        .collect();

    assert_eq!(
        transitions,
        vec![
            (LogLevel::Trace, "Draining and closing open subscriptions.."),
            (LogLevel::Trace, "Closed all open subscriptions."),
            (LogLevel::Trace, "Closing connection..."),
            (LogLevel::Info, "Connection closed."),
        ]
    );

    // the memory bridge is not NATS
    assert!(!records.iter().any(|(_, message)| message.contains("NATS")));
}
