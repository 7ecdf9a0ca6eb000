use crate::cache::MetadataAgeCache;
use crate::clock::{Clock, SystemClock};
use crate::engine::StorageEngine;
use crate::error::{StoreError, StoreResult};
use crate::filter::{filter_all_page, filter_stream_page};
use crate::gap::reconcile_forward_all_page;
use crate::model::{Direction, Message, RawAllPage, RawStreamPage, ReadStreamStatus, StreamId, StreamMetadataResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration knobs for a `ReadonlyStreamStore`. Mirrors the shape of the
/// teacher's `IngestConfig`: plain struct, `Default` impl, no hidden magic.
#[derive(Clone)]
pub struct StoreConfig {
    pub metadata_cache_expiry: Duration,
    pub metadata_cache_max_size: usize,
    pub gap_reload_interval: Duration,
    pub clock: Arc<dyn Clock>,
    pub log_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            metadata_cache_expiry: Duration::from_secs(60),
            metadata_cache_max_size: 10_000,
            gap_reload_interval: Duration::from_millis(3000),
            clock: Arc::new(SystemClock),
            log_name: "eventstore".to_string(),
        }
    }
}

pub(crate) struct Inner<E: StorageEngine> {
    pub(crate) engine: E,
    pub(crate) cache: MetadataAgeCache,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) gap_reload_interval: Duration,
    pub(crate) log_name: String,
    pub(crate) disposed: AtomicBool,
    pub(crate) shutdown: CancellationToken,
}

/// The read façade (component D): validates arguments, guards against
/// disposal, and orchestrates the metadata cache, expiry filter, and gap
/// reconciler around a raw engine read.
pub struct ReadonlyStreamStore<E: StorageEngine> {
    pub(crate) inner: Arc<Inner<E>>,
}

impl<E: StorageEngine> Clone for ReadonlyStreamStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: StorageEngine> ReadonlyStreamStore<E> {
    pub fn new(engine: E, config: StoreConfig) -> Self {
        let cache = MetadataAgeCache::new(
            config.metadata_cache_expiry,
            config.metadata_cache_max_size,
            config.clock.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                engine,
                cache,
                clock: config.clock,
                gap_reload_interval: config.gap_reload_interval,
                log_name: config.log_name,
                disposed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// A child of the store's root cancellation token. Disposing the store
    /// cancels this token and, transitively, every derived child token held
    /// by the notifier and subscriptions.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Client-initiated or runtime-initiated disposal. Idempotent.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            self.inner.shutdown.cancel();
        }
    }

    fn check_alive(&self) -> StoreResult<()> {
        if self.is_disposed() {
            return Err(StoreError::ObjectDisposed);
        }
        Ok(())
    }

    pub async fn read_head_position(&self, cancel: CancellationToken) -> StoreResult<i64> {
        self.check_alive()?;
        self.inner
            .engine
            .read_head_position_internal(cancel)
            .await
            .map_err(StoreError::engine)
    }

    pub async fn get_stream_metadata(
        &self,
        stream_id: &StreamId,
        cancel: CancellationToken,
    ) -> StoreResult<StreamMetadataResult> {
        self.check_alive()?;
        if stream_id.is_system() && !stream_id.is_deleted_stream() {
            return Err(StoreError::ArgumentError(format!(
                "cannot read metadata for system stream {stream_id}"
            )));
        }
        self.inner
            .engine
            .get_stream_metadata_internal(stream_id, cancel)
            .await
            .map_err(StoreError::engine)
    }

    pub async fn read_all_forwards(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadAllPage<E>> {
        self.check_alive()?;
        validate_forward_position(from_position_inclusive)?;
        validate_max_count(max_count)?;

        let raw = self
            .inner
            .engine
            .read_all_forwards_internal(from_position_inclusive, max_count, prefetch, cancel.clone())
            .await
            .map_err(StoreError::engine)?;

        let reconciled = reconcile_forward_all_page(
            &self.inner.engine,
            raw,
            from_position_inclusive,
            max_count,
            prefetch,
            self.inner.gap_reload_interval,
            cancel.clone(),
        )
        .await?;

        let filtered = filter_all_page(
            reconciled,
            &self.inner.cache,
            self.inner.clock.as_ref(),
            &self.inner.engine,
            cancel,
        )
        .await;

        Ok(ReadAllPage::new(filtered, Arc::downgrade(&self.inner), max_count, prefetch))
    }

    pub async fn read_all_backwards(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadAllPage<E>> {
        self.check_alive()?;
        validate_backward_position(from_position_inclusive)?;
        validate_max_count(max_count)?;

        let raw = self
            .inner
            .engine
            .read_all_backwards_internal(from_position_inclusive, max_count, prefetch, cancel.clone())
            .await
            .map_err(StoreError::engine)?;

        // Backward all-reads tolerate gaps by definition; no reconciliation.
        let filtered = filter_all_page(raw, &self.inner.cache, self.inner.clock.as_ref(), &self.inner.engine, cancel).await;

        Ok(ReadAllPage::new(filtered, Arc::downgrade(&self.inner), max_count, prefetch))
    }

    pub async fn read_stream_forwards(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadStreamPage<E>> {
        self.check_alive()?;
        validate_forward_position(from_version_inclusive)?;
        validate_max_count(max_count)?;

        let raw = self
            .inner
            .engine
            .read_stream_forwards_internal(stream_id, from_version_inclusive, max_count, prefetch, cancel.clone())
            .await
            .map_err(StoreError::engine)?;

        // Stream versions are dense; forward stream reads never gap-reconcile.
        let filtered = filter_stream_page(raw, &self.inner.cache, self.inner.clock.as_ref(), &self.inner.engine, cancel).await;

        Ok(ReadStreamPage::new(filtered, Arc::downgrade(&self.inner), max_count, prefetch))
    }

    pub async fn read_stream_backwards(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> StoreResult<ReadStreamPage<E>> {
        self.check_alive()?;
        validate_backward_position(from_version_inclusive)?;
        validate_max_count(max_count)?;

        let raw = self
            .inner
            .engine
            .read_stream_backwards_internal(stream_id, from_version_inclusive, max_count, prefetch, cancel.clone())
            .await
            .map_err(StoreError::engine)?;

        let filtered = filter_stream_page(raw, &self.inner.cache, self.inner.clock.as_ref(), &self.inner.engine, cancel).await;

        Ok(ReadStreamPage::new(filtered, Arc::downgrade(&self.inner), max_count, prefetch))
    }
}

fn validate_forward_position(value: i64) -> StoreResult<()> {
    if value < 0 {
        return Err(StoreError::ArgumentError(format!(
            "forward read cursor must be >= 0, got {value}"
        )));
    }
    Ok(())
}

fn validate_backward_position(value: i64) -> StoreResult<()> {
    if value < -1 {
        return Err(StoreError::ArgumentError(format!(
            "backward read cursor must be >= -1, got {value}"
        )));
    }
    Ok(())
}

fn validate_max_count(value: usize) -> StoreResult<()> {
    if value < 1 {
        return Err(StoreError::ArgumentError("max_count must be >= 1".to_string()));
    }
    Ok(())
}

/// A stream read page with a continuation bound to the store that produced
/// it. `read_next` observes the store's disposed flag through a weak handle,
/// so a page outliving its store fails with `ObjectDisposed` rather than
/// keeping the store alive.
pub struct ReadStreamPage<E: StorageEngine> {
    pub stream_id: StreamId,
    pub status: ReadStreamStatus,
    pub from_version: i64,
    pub next_version: i64,
    pub last_version: i64,
    pub last_position: i64,
    pub direction: Direction,
    pub is_end: bool,
    pub messages: Vec<Message>,
    store: Weak<Inner<E>>,
    max_count: usize,
    prefetch: bool,
}

impl<E: StorageEngine> ReadStreamPage<E> {
    fn new(raw: RawStreamPage, store: Weak<Inner<E>>, max_count: usize, prefetch: bool) -> Self {
        Self {
            stream_id: raw.stream_id,
            status: raw.status,
            from_version: raw.from_version,
            next_version: raw.next_version,
            last_version: raw.last_version,
            last_position: raw.last_position,
            direction: raw.direction,
            is_end: raw.is_end,
            messages: raw.messages,
            store,
            max_count,
            prefetch,
        }
    }

    /// Reads the page that logically follows this one under the same
    /// direction and options.
    pub async fn read_next(&self, cancel: CancellationToken) -> StoreResult<Self> {
        let inner = self.store.upgrade().ok_or(StoreError::ObjectDisposed)?;
        let store = ReadonlyStreamStore { inner };
        match self.direction {
            Direction::Forwards => {
                store
                    .read_stream_forwards(&self.stream_id, self.next_version, self.max_count, self.prefetch, cancel)
                    .await
            }
            Direction::Backwards => {
                store
                    .read_stream_backwards(&self.stream_id, self.next_version, self.max_count, self.prefetch, cancel)
                    .await
            }
        }
    }
}

pub struct ReadAllPage<E: StorageEngine> {
    pub from_position: i64,
    pub next_position: i64,
    pub is_end: bool,
    pub direction: Direction,
    pub messages: Vec<Message>,
    store: Weak<Inner<E>>,
    max_count: usize,
    prefetch: bool,
}

impl<E: StorageEngine> ReadAllPage<E> {
    fn new(raw: RawAllPage, store: Weak<Inner<E>>, max_count: usize, prefetch: bool) -> Self {
        Self {
            from_position: raw.from_position,
            next_position: raw.next_position,
            is_end: raw.is_end,
            direction: raw.direction,
            messages: raw.messages,
            store,
            max_count,
            prefetch,
        }
    }

    pub async fn read_next(&self, cancel: CancellationToken) -> StoreResult<Self> {
        let inner = self.store.upgrade().ok_or(StoreError::ObjectDisposed)?;
        let store = ReadonlyStreamStore { inner };
        match self.direction {
            Direction::Forwards => {
                store
                    .read_all_forwards(self.next_position, self.max_count, self.prefetch, cancel)
                    .await
            }
            Direction::Backwards => {
                store
                    .read_all_backwards(self.next_position, self.max_count, self.prefetch, cancel)
                    .await
            }
        }
    }
}
