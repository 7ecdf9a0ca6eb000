use crate::cache::MetadataAgeCache;
use crate::clock::Clock;
use crate::engine::StorageEngine;
use crate::model::{Message, RawAllPage, RawStreamPage};
use log::error;
use tokio_util::sync::CancellationToken;

/// Drops expired messages from a stream page and requests their purge.
/// Cursor fields are preserved exactly as produced by the engine — filtering
/// never advances the cursor, so a filtered page may come back short (even
/// empty) while `is_end = false`.
pub async fn filter_stream_page<E: StorageEngine>(
    mut page: RawStreamPage,
    cache: &MetadataAgeCache,
    clock: &dyn Clock,
    engine: &E,
    cancel: CancellationToken,
) -> RawStreamPage {
    page.messages = filter_messages(page.messages, cache, clock, engine, cancel).await;
    page
}

pub async fn filter_all_page<E: StorageEngine>(
    mut page: RawAllPage,
    cache: &MetadataAgeCache,
    clock: &dyn Clock,
    engine: &E,
    cancel: CancellationToken,
) -> RawAllPage {
    page.messages = filter_messages(page.messages, cache, clock, engine, cancel).await;
    page
}

async fn filter_messages<E: StorageEngine>(
    messages: Vec<Message>,
    cache: &MetadataAgeCache,
    clock: &dyn Clock,
    engine: &E,
    cancel: CancellationToken,
) -> Vec<Message> {
    let mut kept = Vec::with_capacity(messages.len());
    for message in messages {
        if message.stream_id.is_system() {
            kept.push(message);
            continue;
        }

        let max_age = cache
            .get_max_age(&message.stream_id, engine, cancel.clone())
            .await
            .unwrap_or_else(|err| {
                // A cache-load failure must not block the read; treat the
                // message as valid and let the next read retry the lookup.
                error!("failed to load max_age for stream {}: {err}", message.stream_id);
                None
            });

        let Some(max_age_seconds) = max_age else {
            kept.push(message);
            continue;
        };

        let now = clock.now_utc();
        let expires_at = message.created_utc + chrono::Duration::seconds(max_age_seconds as i64);
        if expires_at <= now {
            if let Err(err) = engine.purge_expired_message(&message).await {
                error!(
                    "failed to purge expired message {} on stream {}: {err}",
                    message.message_id, message.stream_id
                );
            }
        } else {
            kept.push(message);
        }
    }
    kept
}
