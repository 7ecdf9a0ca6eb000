//! Composition root: wires the metadata cache, read façade, head-position
//! notifier, and subscription runtime behind a single `EventStore<E>`
//! handle, the way the teacher's top-level crate composes `mmoldb-db` and
//! `mmoldb-ingest` behind its own service type.

mod config;

pub use config::EventStoreConfig;

pub use eventstore_core::{
    Direction, Message, ReadAllPage, ReadStreamPage, ReadStreamStatus, StorageEngine, StoreError,
    StoreResult, StreamId, StreamIdError, StreamMetadataResult,
};
pub use eventstore_sub::{
    AllSubscriptionHandle, BoxFuture, CallbackError, CaughtUpCallback, ControlFlow, DropCallback,
    DropReason, MessageCallback, StreamSubscriptionHandle, SubscriptionState,
};

use eventstore_core::ReadonlyStreamStore;
use eventstore_notify::HeadPositionNotifier;
use eventstore_sub::{SubscriptionConfig, StoreHeadPositionSource, subscribe_to_all, subscribe_to_stream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A readonly stream store with a running head-position notifier attached.
/// `dispose()` cancels the shared shutdown token, which stops the notifier
/// and drops every live subscription exactly once.
pub struct EventStore<E: StorageEngine> {
    store: ReadonlyStreamStore<E>,
    notifier: HeadPositionNotifier,
    config: EventStoreConfig,
}

impl<E: StorageEngine> std::fmt::Debug for EventStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore").finish_non_exhaustive()
    }
}

impl<E: StorageEngine> EventStore<E> {
    pub fn new(engine: E, config: EventStoreConfig) -> StoreResult<Self> {
        config.validate()?;

        let store = ReadonlyStreamStore::new(engine, config.store_config());
        let source = Arc::new(StoreHeadPositionSource::new(Arc::new(store.clone())));
        let notifier = HeadPositionNotifier::spawn(source, config.notifier_config(), store.shutdown_token());

        Ok(Self { store, notifier, config })
    }

    pub fn is_disposed(&self) -> bool {
        self.store.is_disposed()
    }

    pub fn dispose(&self) {
        self.store.dispose();
    }

    pub async fn read_head_position(&self, cancel: CancellationToken) -> StoreResult<i64> {
        self.store.read_head_position(cancel).await
    }

    pub async fn get_stream_metadata(&self, stream_id: &StreamId, cancel: CancellationToken) -> StoreResult<StreamMetadataResult> {
        self.store.get_stream_metadata(stream_id, cancel).await
    }

    pub async fn read_all_forwards(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadAllPage<E>> {
        self.store.read_all_forwards(from_position_inclusive, max_count, prefetch, cancel).await
    }

    pub async fn read_all_backwards(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadAllPage<E>> {
        self.store.read_all_backwards(from_position_inclusive, max_count, prefetch, cancel).await
    }

    pub async fn read_stream_forwards(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadStreamPage<E>> {
        self.store.read_stream_forwards(stream_id, from_version_inclusive, max_count, prefetch, cancel).await
    }

    pub async fn read_stream_backwards(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadStreamPage<E>> {
        self.store.read_stream_backwards(stream_id, from_version_inclusive, max_count, prefetch, cancel).await
    }

    /// Subscribes to a single stream's messages, starting just after
    /// `continue_after_version` or at the stream's current head if `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe_to_stream(
        &self,
        stream_id: StreamId,
        continue_after_version: Option<i64>,
        on_message: MessageCallback,
        on_drop: Option<DropCallback>,
        on_caught_up: Option<CaughtUpCallback>,
        prefetch: bool,
        name: Option<String>,
    ) -> StoreResult<StreamSubscriptionHandle> {
        if self.store.is_disposed() {
            return Err(StoreError::ObjectDisposed);
        }

        Ok(subscribe_to_stream(
            self.store.clone(),
            stream_id,
            continue_after_version,
            self.notifier.subscribe(),
            self.subscription_config(prefetch, name),
            on_message,
            on_drop,
            on_caught_up,
            self.store.shutdown_token(),
        ))
    }

    /// Subscribes to the all-stream, starting just after
    /// `continue_after_position` or at the current head if `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe_to_all(
        &self,
        continue_after_position: Option<i64>,
        on_message: MessageCallback,
        on_drop: Option<DropCallback>,
        on_caught_up: Option<CaughtUpCallback>,
        prefetch: bool,
        name: Option<String>,
    ) -> StoreResult<AllSubscriptionHandle> {
        if self.store.is_disposed() {
            return Err(StoreError::ObjectDisposed);
        }

        Ok(subscribe_to_all(
            self.store.clone(),
            continue_after_position,
            self.notifier.subscribe(),
            self.subscription_config(prefetch, name),
            on_message,
            on_drop,
            on_caught_up,
            self.store.shutdown_token(),
        ))
    }

    fn subscription_config(&self, prefetch: bool, name: Option<String>) -> SubscriptionConfig {
        SubscriptionConfig {
            max_count: self.config.subscription_page_size,
            prefetch,
            live_follow_wake_interval: self.config.subscription_live_follow_interval,
            name,
        }
    }
}
