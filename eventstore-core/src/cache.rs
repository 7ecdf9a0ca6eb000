use crate::clock::Clock;
use crate::engine::StorageEngine;
use crate::error::{StoreError, StoreResult};
use crate::model::StreamId;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

enum Entry {
    /// A load is already in flight; secondary lookups wait on the `Notify`
    /// and re-check the map once it fires, rather than issuing a second
    /// engine call.
    Pending(Arc<Notify>),
    Resolved {
        value: Option<u32>,
        cached_at: DateTime<Utc>,
    },
}

struct State {
    entries: HashMap<StreamId, Entry>,
    /// Most-recently-used at the back. Only resolved entries live here;
    /// an entry is pushed to the back whenever it's read or refreshed.
    lru: VecDeque<StreamId>,
}

/// Caches `max_age_seconds` per stream, bounded in size with TTL-based
/// refresh and LRU eviction. Process-wide within one store instance, never
/// shared across instances.
pub struct MetadataAgeCache {
    expiry: chrono::Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl MetadataAgeCache {
    pub fn new(expiry: Duration, max_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            expiry: chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::MAX),
            max_size,
            clock,
            state: Mutex::new(State {
                entries: HashMap::new(),
                lru: VecDeque::new(),
            }),
        }
    }

    /// Returns the cached `max_age_seconds` for `stream_id`, loading it via
    /// `engine.get_stream_metadata_internal` on a miss or stale entry.
    /// Concurrent lookups for the same absent key coalesce onto a single
    /// underlying load.
    pub async fn get_max_age<E: StorageEngine>(
        &self,
        stream_id: &StreamId,
        engine: &E,
        cancel: CancellationToken,
    ) -> StoreResult<Option<u32>> {
        loop {
            let wait_on = {
                let mut state = self.state.lock().await;
                match state.entries.get(stream_id) {
                    Some(Entry::Resolved { value, cached_at }) => {
                        if self.clock.now_utc() - *cached_at < self.expiry {
                            let value = *value;
                            self.touch(&mut state, stream_id);
                            return Ok(value);
                        }
                        // Stale: fall through and become the loader.
                        None
                    }
                    Some(Entry::Pending(notify)) => Some(notify.clone()),
                    None => None,
                }
            };

            if let Some(notify) = wait_on {
                notify.notified().await;
                continue;
            }

            // We're the loader. Claim the slot before releasing the lock so
            // concurrent callers see `Pending` instead of racing us.
            let notify = Arc::new(Notify::new());
            {
                let mut state = self.state.lock().await;
                state
                    .entries
                    .insert(stream_id.clone(), Entry::Pending(notify.clone()));
            }

            let loaded = engine
                .get_stream_metadata_internal(stream_id, cancel.clone())
                .await
                .map_err(StoreError::engine)
                .map(|meta| meta.max_age_seconds);

            let mut state = self.state.lock().await;
            match &loaded {
                Ok(value) => {
                    state.entries.insert(
                        stream_id.clone(),
                        Entry::Resolved {
                            value: *value,
                            cached_at: self.clock.now_utc(),
                        },
                    );
                    self.touch(&mut state, stream_id);
                    self.evict_if_needed(&mut state);
                }
                Err(_) => {
                    // Don't cache a failed load; let the next caller retry.
                    state.entries.remove(stream_id);
                }
            }
            notify.notify_waiters();
            return loaded;
        }
    }

    fn touch(&self, state: &mut State, stream_id: &StreamId) {
        state.lru.retain(|id| id != stream_id);
        state.lru.push_back(stream_id.clone());
    }

    fn evict_if_needed(&self, state: &mut State) {
        while state.entries.len() > self.max_size {
            let Some(oldest) = state.lru.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, RawAllPage, RawStreamPage, StreamMetadataResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClock(std::sync::Mutex<DateTime<Utc>>);

    impl Clock for FixedClock {
        fn now_utc(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct CountingEngine {
        calls: AtomicUsize,
        max_age: Option<u32>,
    }

    impl StorageEngine for CountingEngine {
        type Error = std::io::Error;

        async fn read_all_forwards_internal(
            &self,
            _: i64,
            _: usize,
            _: bool,
            _: CancellationToken,
        ) -> Result<RawAllPage, Self::Error> {
            unreachable!()
        }
        async fn read_all_backwards_internal(
            &self,
            _: i64,
            _: usize,
            _: bool,
            _: CancellationToken,
        ) -> Result<RawAllPage, Self::Error> {
            unreachable!()
        }
        async fn read_stream_forwards_internal(
            &self,
            _: &StreamId,
            _: i64,
            _: usize,
            _: bool,
            _: CancellationToken,
        ) -> Result<RawStreamPage, Self::Error> {
            unreachable!()
        }
        async fn read_stream_backwards_internal(
            &self,
            _: &StreamId,
            _: i64,
            _: usize,
            _: bool,
            _: CancellationToken,
        ) -> Result<RawStreamPage, Self::Error> {
            unreachable!()
        }
        async fn read_head_position_internal(&self, _: CancellationToken) -> Result<i64, Self::Error> {
            unreachable!()
        }
        async fn get_stream_metadata_internal(
            &self,
            stream_id: &StreamId,
            _: CancellationToken,
        ) -> Result<StreamMetadataResult, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StreamMetadataResult {
                stream_id: stream_id.clone(),
                metadata_stream_version: 0,
                max_age_seconds: self.max_age,
                max_count: None,
                metadata_json: None,
            })
        }
        async fn purge_expired_message(&self, _: &Message) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn caches_none_without_refetching() {
        let clock = Arc::new(FixedClock(std::sync::Mutex::new(Utc::now())));
        let cache = MetadataAgeCache::new(Duration::from_secs(60), 16, clock);
        let engine = CountingEngine {
            calls: AtomicUsize::new(0),
            max_age: None,
        };
        let id = StreamId::new("orders-1").unwrap();

        for _ in 0..3 {
            let v = cache
                .get_max_age(&id, &engine, CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(v, None);
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_after_ttl_expires() {
        let now = Utc::now();
        let clock = Arc::new(FixedClock(std::sync::Mutex::new(now)));
        let cache = MetadataAgeCache::new(Duration::from_secs(10), 16, clock.clone());
        let engine = CountingEngine {
            calls: AtomicUsize::new(0),
            max_age: Some(30),
        };
        let id = StreamId::new("orders-1").unwrap();

        cache
            .get_max_age(&id, &engine, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        *clock.0.lock().unwrap() = now + chrono::Duration::seconds(20);
        cache
            .get_max_age(&id, &engine, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn evicts_least_recently_used_entry() {
        let clock = Arc::new(FixedClock(std::sync::Mutex::new(Utc::now())));
        let cache = MetadataAgeCache::new(Duration::from_secs(60), 2, clock);
        let engine = CountingEngine {
            calls: AtomicUsize::new(0),
            max_age: Some(5),
        };

        let a = StreamId::new("a").unwrap();
        let b = StreamId::new("b").unwrap();
        let c = StreamId::new("c").unwrap();

        cache.get_max_age(&a, &engine, CancellationToken::new()).await.unwrap();
        cache.get_max_age(&b, &engine, CancellationToken::new()).await.unwrap();
        cache.get_max_age(&c, &engine, CancellationToken::new()).await.unwrap();

        // `a` should have been evicted; fetching it again issues a new call.
        let calls_before = engine.calls.load(Ordering::SeqCst);
        cache.get_max_age(&a, &engine, CancellationToken::new()).await.unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), calls_before + 1);
    }
}
