use crate::model::{Message, RawAllPage, RawStreamPage, StreamId, StreamMetadataResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The narrow interface the core depends on. All methods must be safe for
/// concurrent invocation; the core never assumes it has exclusive access to
/// the engine.
///
/// This is deliberately not object-safe (native `async fn` in trait) — the
/// core is generic over a single concrete engine per store instance, so
/// there is no need to pay for dynamic dispatch or box every future.
pub trait StorageEngine: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_all_forwards_internal(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RawAllPage, Self::Error>> + Send;

    fn read_all_backwards_internal(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RawAllPage, Self::Error>> + Send;

    fn read_stream_forwards_internal(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RawStreamPage, Self::Error>> + Send;

    fn read_stream_backwards_internal(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<RawStreamPage, Self::Error>> + Send;

    fn read_head_position_internal(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<i64, Self::Error>> + Send;

    fn get_stream_metadata_internal(
        &self,
        stream_id: &StreamId,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<StreamMetadataResult, Self::Error>> + Send;

    /// Fire-and-forget: callers never propagate this error, only log it.
    fn purge_expired_message(
        &self,
        message: &Message,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Lets callers hold a shared handle to an engine (to drive it from outside
/// the store, as tests and embedding hosts often need to) while the store
/// itself still owns a value that implements `StorageEngine` directly.
impl<T: StorageEngine> StorageEngine for Arc<T> {
    type Error = T::Error;

    async fn read_all_forwards_internal(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> Result<RawAllPage, Self::Error> {
        (**self).read_all_forwards_internal(from_position_inclusive, max_count, prefetch, cancel).await
    }

    async fn read_all_backwards_internal(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> Result<RawAllPage, Self::Error> {
        (**self).read_all_backwards_internal(from_position_inclusive, max_count, prefetch, cancel).await
    }

    async fn read_stream_forwards_internal(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> Result<RawStreamPage, Self::Error> {
        (**self)
            .read_stream_forwards_internal(stream_id, from_version_inclusive, max_count, prefetch, cancel)
            .await
    }

    async fn read_stream_backwards_internal(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        prefetch: bool,
        cancel: CancellationToken,
    ) -> Result<RawStreamPage, Self::Error> {
        (**self)
            .read_stream_backwards_internal(stream_id, from_version_inclusive, max_count, prefetch, cancel)
            .await
    }

    async fn read_head_position_internal(&self, cancel: CancellationToken) -> Result<i64, Self::Error> {
        (**self).read_head_position_internal(cancel).await
    }

    async fn get_stream_metadata_internal(&self, stream_id: &StreamId, cancel: CancellationToken) -> Result<StreamMetadataResult, Self::Error> {
        (**self).get_stream_metadata_internal(stream_id, cancel).await
    }

    async fn purge_expired_message(&self, message: &Message) -> Result<(), Self::Error> {
        (**self).purge_expired_message(message).await
    }
}
