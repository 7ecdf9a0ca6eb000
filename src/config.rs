use eventstore_core::{Clock, StoreConfig, SystemClock};
use eventstore_core::{StoreError, StoreResult};
use eventstore_notify::HeadPositionNotifierConfig;
use std::sync::Arc;
use std::time::Duration;

/// Configuration knobs for an `EventStore`. Mirrors the shape of the
/// teacher's `IngestConfig`: a plain struct with a `Default` impl, validated
/// once at construction rather than re-checked on every call.
#[derive(Clone)]
pub struct EventStoreConfig {
    pub metadata_cache_expiry: Duration,
    pub metadata_cache_max_size: usize,
    pub gap_reload_interval: Duration,
    pub poll_interval: Duration,
    pub subscription_page_size: usize,
    pub subscription_live_follow_interval: Duration,
    pub clock: Arc<dyn Clock>,
    pub log_name: String,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            metadata_cache_expiry: Duration::from_secs(60),
            metadata_cache_max_size: 10_000,
            gap_reload_interval: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(1000),
            subscription_page_size: 100,
            subscription_live_follow_interval: Duration::from_secs(5),
            clock: Arc::new(SystemClock),
            log_name: "eventstore".to_string(),
        }
    }
}

impl EventStoreConfig {
    /// Sanity-checks the knobs that would otherwise fail silently or spin:
    /// a zero-sized cache never caches anything, a zero interval busy-loops.
    pub fn validate(&self) -> StoreResult<()> {
        if self.metadata_cache_max_size == 0 {
            return Err(StoreError::ArgumentError("metadata_cache_max_size must be non-zero".to_string()));
        }
        if self.gap_reload_interval.is_zero() {
            return Err(StoreError::ArgumentError("gap_reload_interval must be non-zero".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(StoreError::ArgumentError("poll_interval must be non-zero".to_string()));
        }
        if self.subscription_page_size == 0 {
            return Err(StoreError::ArgumentError("subscription_page_size must be non-zero".to_string()));
        }
        Ok(())
    }

    pub(crate) fn store_config(&self) -> StoreConfig {
        StoreConfig {
            metadata_cache_expiry: self.metadata_cache_expiry,
            metadata_cache_max_size: self.metadata_cache_max_size,
            gap_reload_interval: self.gap_reload_interval,
            clock: self.clock.clone(),
            log_name: self.log_name.clone(),
        }
    }

    pub(crate) fn notifier_config(&self) -> HeadPositionNotifierConfig {
        HeadPositionNotifierConfig {
            poll_interval: self.poll_interval,
        }
    }
}
