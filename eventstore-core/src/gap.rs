use crate::engine::StorageEngine;
use crate::error::{StoreError, StoreResult};
use crate::model::RawAllPage;
use hashbrown::HashSet;
use log::debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Detects and tolerates holes in the global position sequence of a forward
/// all-stream read. Only forward all-reads gap-reconcile: stream reads are
/// dense by construction, and reverse all-reads tolerate gaps by definition.
///
/// See `spec.md` §4.C for the full algorithm this implements.
pub async fn reconcile_forward_all_page<E: StorageEngine>(
    engine: &E,
    first_page: RawAllPage,
    from_position_inclusive: i64,
    max_count: usize,
    prefetch: bool,
    reload_delay: Duration,
    cancel: CancellationToken,
) -> StoreResult<RawAllPage> {
    // Fast path: gaps at the tail of a non-terminal page, or in pages with
    // at most one message, would be spurious to reconcile.
    if !first_page.is_end || first_page.messages.len() <= 1 {
        return Ok(first_page);
    }

    let mut page = first_page;

    // Head-gap check.
    if page.messages[0].position != from_position_inclusive {
        debug!(
            "head gap at position {from_position_inclusive}, reloading after {:?}",
            reload_delay
        );
        sleep_or_cancel(reload_delay, &cancel).await?;
        page = reread(engine, from_position_inclusive, max_count, prefetch, &cancel).await?;
    }

    // Body-gap loop.
    let mut prev_missing: HashSet<i64> = HashSet::new();
    loop {
        let current_missing = missing_positions(&page);
        if current_missing.is_empty() {
            return Ok(page);
        }

        let fresh: HashSet<i64> = current_missing.difference(&prev_missing).copied().collect();
        if fresh.is_empty() {
            // Every remaining gap was already missing on a prior
            // observation: these are permanent rollbacks, not in-flight
            // writers. Return the page as-is.
            return Ok(page);
        }

        debug!("{} fresh gap(s) observed, reloading after {:?}", fresh.len(), reload_delay);
        prev_missing = current_missing;
        sleep_or_cancel(reload_delay, &cancel).await?;
        page = reread(engine, from_position_inclusive, max_count, prefetch, &cancel).await?;

        // A re-read can come back non-terminal or trivially small once the
        // gaps fill in; that's no longer our concern to reconcile further.
        if !page.is_end || page.messages.len() <= 1 {
            return Ok(page);
        }
    }
}

fn missing_positions(page: &RawAllPage) -> HashSet<i64> {
    let mut missing = HashSet::new();
    for window in page.messages.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        let mut p = a.position + 1;
        while p < b.position {
            missing.insert(p);
            p += 1;
        }
    }
    missing
}

async fn reread<E: StorageEngine>(
    engine: &E,
    from_position_inclusive: i64,
    max_count: usize,
    prefetch: bool,
    cancel: &CancellationToken,
) -> StoreResult<RawAllPage> {
    engine
        .read_all_forwards_internal(from_position_inclusive, max_count, prefetch, cancel.clone())
        .await
        .map_err(StoreError::engine)
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> StoreResult<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, Message, RawStreamPage, StreamId, StreamMetadataResult};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn msg(position: i64) -> Message {
        Message {
            stream_id: StreamId::new("s").unwrap(),
            stream_version: 0,
            position,
            message_id: Uuid::new_v4(),
            message_type: "test".to_string(),
            created_utc: Utc::now(),
            json_metadata: None,
            json_data: None,
        }
    }

    struct ScriptedEngine {
        /// The page returned by every `read_all_forwards_internal` reread.
        next_page: RawAllPage,
        calls: AtomicUsize,
    }

    impl StorageEngine for ScriptedEngine {
        type Error = std::io::Error;

        async fn read_all_forwards_internal(
            &self,
            _: i64,
            _: usize,
            _: bool,
            _: CancellationToken,
        ) -> Result<RawAllPage, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_page.clone())
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
            Ok(StreamMetadataResult {
                stream_id: stream_id.clone(),
                metadata_stream_version: 0,
                max_age_seconds: None,
                max_count: None,
                metadata_json: None,
            })
        }
        async fn purge_expired_message(&self, _: &Message) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn dense_page_returns_without_reconciling() {
        let page = RawAllPage {
            from_position: 0,
            next_position: -1,
            is_end: true,
            direction: Direction::Forwards,
            messages: vec![msg(1), msg(2), msg(3)],
        };
        let engine = ScriptedEngine {
            next_page: page.clone(),
            calls: AtomicUsize::new(0),
        };

        let result = reconcile_forward_all_page(
            &engine,
            page,
            1,
            10,
            false,
            Duration::from_millis(1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.messages.len(), 3);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn permanent_gap_is_returned_after_one_reload() {
        let page = RawAllPage {
            from_position: 1,
            next_position: -1,
            is_end: true,
            direction: Direction::Forwards,
            messages: vec![msg(1), msg(3), msg(4)],
        };
        let engine = ScriptedEngine {
            next_page: page.clone(),
            calls: AtomicUsize::new(0),
        };

        let result = reconcile_forward_all_page(
            &engine,
            page,
            1,
            10,
            false,
            Duration::from_millis(1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            result.messages.iter().map(|m| m.position).collect::<Vec<_>>(),
            vec![1, 3, 4]
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_gap_fills_in_on_retry() {
        let with_gap = RawAllPage {
            from_position: 1,
            next_position: -1,
            is_end: true,
            direction: Direction::Forwards,
            messages: vec![msg(1), msg(3)],
        };
        let filled = RawAllPage {
            from_position: 1,
            next_position: -1,
            is_end: true,
            direction: Direction::Forwards,
            messages: vec![msg(1), msg(2), msg(3)],
        };
        let engine = ScriptedEngine {
            next_page: filled.clone(),
            calls: AtomicUsize::new(0),
        };

        let result = reconcile_forward_all_page(
            &engine,
            with_gap,
            1,
            10,
            false,
            Duration::from_millis(1),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            result.messages.iter().map(|m| m.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }
}
