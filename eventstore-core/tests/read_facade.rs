use chrono::Utc;
use eventstore_core::{ReadonlyStreamStore, StoreConfig, StoreError, StreamId};
use eventstore_testkit::InMemoryEngine;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config() -> StoreConfig {
    StoreConfig {
        gap_reload_interval: Duration::from_millis(10),
        ..StoreConfig::default()
    }
}

#[tokio::test]
async fn dense_all_read_returns_every_message_in_order() {
    let engine = InMemoryEngine::new();
    let stream = StreamId::new("orders-1").unwrap();
    for _ in 0..3 {
        engine.append(&stream, "OrderPlaced", Utc::now());
    }

    let store = ReadonlyStreamStore::new(engine, config());
    let page = store
        .read_all_forwards(0, 10, false, CancellationToken::new())
        .await
        .unwrap();

    assert!(page.is_end);
    assert_eq!(page.messages.iter().map(|m| m.position).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test]
async fn permanent_gap_is_tolerated_and_returned() {
    let engine = InMemoryEngine::new();
    let stream = StreamId::new("orders-1").unwrap();
    engine.append(&stream, "OrderPlaced", Utc::now()); // position 0
    engine.reserve_gap(); // position 1, never filled (rolled back)
    engine.append(&stream, "OrderShipped", Utc::now()); // position 2

    let store = ReadonlyStreamStore::new(engine, config());
    let page = store
        .read_all_forwards(0, 10, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.messages.iter().map(|m| m.position).collect::<Vec<_>>(), vec![0, 2]);
}

#[tokio::test]
async fn read_next_follows_the_cursor_to_the_end() {
    let engine = InMemoryEngine::new();
    let stream = StreamId::new("orders-1").unwrap();
    for _ in 0..5 {
        engine.append(&stream, "OrderPlaced", Utc::now());
    }

    let store = ReadonlyStreamStore::new(engine, config());
    let mut page = store
        .read_stream_forwards(&stream, 0, 2, false, CancellationToken::new())
        .await
        .unwrap();

    let mut all_versions = page.messages.iter().map(|m| m.stream_version).collect::<Vec<_>>();
    while !page.is_end {
        page = page.read_next(CancellationToken::new()).await.unwrap();
        all_versions.extend(page.messages.iter().map(|m| m.stream_version));
    }

    assert_eq!(all_versions, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn forward_backward_round_trip_is_reversed() {
    let engine = InMemoryEngine::new();
    let stream = StreamId::new("orders-1").unwrap();
    for _ in 0..4 {
        engine.append(&stream, "OrderPlaced", Utc::now());
    }

    let store = ReadonlyStreamStore::new(engine, config());
    let forward = store
        .read_stream_forwards(&stream, 0, 10, false, CancellationToken::new())
        .await
        .unwrap();
    let backward = store
        .read_stream_backwards(&stream, forward.last_version, 10, false, CancellationToken::new())
        .await
        .unwrap();

    let forward_versions: Vec<_> = forward.messages.iter().map(|m| m.stream_version).collect();
    let mut backward_versions: Vec<_> = backward.messages.iter().map(|m| m.stream_version).collect();
    backward_versions.reverse();

    assert_eq!(forward_versions, backward_versions);
}

#[tokio::test]
async fn expired_messages_are_filtered_and_purged() {
    let engine = InMemoryEngine::new();
    let stream = StreamId::new("orders-1").unwrap();
    let base = Utc::now() - chrono::Duration::seconds(20);
    engine.append(&stream, "A", base); // created 20s ago
    engine.append(&stream, "B", base + chrono::Duration::seconds(5)); // 15s ago
    engine.append(&stream, "C", base + chrono::Duration::seconds(15)); // 5s ago
    engine.set_max_age(&stream, Some(10));

    let store = ReadonlyStreamStore::new(engine, config());
    let page = store
        .read_stream_forwards(&stream, 0, 10, false, CancellationToken::new())
        .await
        .unwrap();

    // Only the message younger than 10s survives; the other two are purged.
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].message_type, "C");
}

#[tokio::test]
async fn system_streams_are_never_age_filtered() {
    let engine = InMemoryEngine::new();
    let stream = StreamId::new("$deleted").unwrap();
    let old = Utc::now() - chrono::Duration::seconds(1000);
    engine.append(&stream, "StreamDeleted", old);
    engine.set_max_age(&stream, Some(1));

    let store = ReadonlyStreamStore::new(engine, config());
    let page = store
        .read_stream_forwards(&stream, 0, 10, false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.messages.len(), 1);
}

#[tokio::test]
async fn get_stream_metadata_rejects_system_streams() {
    let engine = InMemoryEngine::new();
    let store = ReadonlyStreamStore::new(engine, config());
    let system_stream = StreamId::new("$checkpoints").unwrap();

    let result = store.get_stream_metadata(&system_stream, CancellationToken::new()).await;
    assert!(matches!(result, Err(StoreError::ArgumentError(_))));
}

#[tokio::test]
async fn get_stream_metadata_allows_the_deleted_stream() {
    let engine = InMemoryEngine::new();
    let store = ReadonlyStreamStore::new(engine, config());
    let result = store.get_stream_metadata(&StreamId::deleted(), CancellationToken::new()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn disposed_store_rejects_further_reads() {
    let engine = InMemoryEngine::new();
    let store = ReadonlyStreamStore::new(engine, config());
    store.dispose();
    store.dispose(); // idempotent

    let result = store.read_all_forwards(0, 10, false, CancellationToken::new()).await;
    assert!(matches!(result, Err(StoreError::ObjectDisposed)));
}

#[tokio::test]
async fn invalid_arguments_are_rejected() {
    let engine = InMemoryEngine::new();
    let store = ReadonlyStreamStore::new(engine, config());
    let stream = StreamId::new("orders-1").unwrap();

    assert!(matches!(
        store.read_stream_forwards(&stream, -1, 10, false, CancellationToken::new()).await,
        Err(StoreError::ArgumentError(_))
    ));
    assert!(matches!(
        store.read_stream_backwards(&stream, -2, 10, false, CancellationToken::new()).await,
        Err(StoreError::ArgumentError(_))
    ));
    assert!(matches!(
        store.read_all_forwards(0, 0, false, CancellationToken::new()).await,
        Err(StoreError::ArgumentError(_))
    ));
}
