use eventstore_core::{ReadonlyStreamStore, StorageEngine};
use eventstore_notify::HeadPositionSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adapts a `ReadonlyStreamStore` to the notifier's pull-only probe without
/// the notifier crate ever seeing `eventstore-core`'s domain types.
pub struct StoreHeadPositionSource<E: StorageEngine> {
    store: Arc<ReadonlyStreamStore<E>>,
}

impl<E: StorageEngine> StoreHeadPositionSource<E> {
    pub fn new(store: Arc<ReadonlyStreamStore<E>>) -> Self {
        Self { store }
    }
}

impl<E: StorageEngine> HeadPositionSource for StoreHeadPositionSource<E> {
    type Error = eventstore_core::StoreError;

    async fn read_head_position(&self, cancel: CancellationToken) -> Result<i64, Self::Error> {
        self.store.read_head_position(cancel).await
    }
}
