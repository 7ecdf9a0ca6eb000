//! An in-memory `StorageEngine` fixture used by the test suites of
//! `eventstore-core`, `eventstore-sub`, and the `eventstore` composition
//! root. Not a production backend — no persistence, no indexing beyond a
//! couple of `Vec`s behind a mutex.

use chrono::{DateTime, Utc};
use eventstore_core::{
    Direction, Message, RawAllPage, RawStreamPage, ReadStreamStatus, StorageEngine, StreamId,
    StreamMetadataResult,
};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture engine has no storage for stream {0}")]
    UnknownStream(StreamId),
}

struct State {
    streams: hashbrown::HashMap<StreamId, Vec<Message>>,
    all: Vec<Option<Message>>,
    metadata: hashbrown::HashMap<StreamId, StreamMetadataResult>,
    purged: Vec<Uuid>,
    next_position: i64,
}

/// An append-only, single-process event log good enough to exercise the
/// read façade, gap reconciler, and subscription runtime in tests.
pub struct InMemoryEngine {
    state: Mutex<State>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                streams: hashbrown::HashMap::new(),
                all: Vec::new(),
                metadata: hashbrown::HashMap::new(),
                purged: Vec::new(),
                next_position: 0,
            }),
        }
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to `stream_id`, assigning the next stream version
    /// and the next global position.
    pub fn append(&self, stream_id: &StreamId, message_type: &str, created_utc: DateTime<Utc>) -> Message {
        let mut state = self.state.lock().unwrap();
        let position = state.next_position;
        state.next_position += 1;

        let version = state.streams.get(stream_id).map(|m| m.len() as u32).unwrap_or(0);
        let message = Message {
            stream_id: stream_id.clone(),
            stream_version: version,
            position,
            message_id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            created_utc,
            json_metadata: None,
            json_data: Some(serde_json::json!({})),
        };

        state.streams.entry(stream_id.clone()).or_default().push(message.clone());
        state.all.push(Some(message.clone()));
        message
    }

    /// Reserves the next global position without committing a message,
    /// simulating an in-flight or rolled-back writer transaction.
    pub fn reserve_gap(&self) {
        let mut state = self.state.lock().unwrap();
        state.all.push(None);
        state.next_position += 1;
    }

    /// Fills in a previously reserved gap at `position`, simulating a
    /// delayed commit becoming visible.
    pub fn fill_gap(&self, position: i64, stream_id: &StreamId, message_type: &str, created_utc: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        let version = state.streams.get(stream_id).map(|m| m.len() as u32).unwrap_or(0);
        let message = Message {
            stream_id: stream_id.clone(),
            stream_version: version,
            position,
            message_id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            created_utc,
            json_metadata: None,
            json_data: Some(serde_json::json!({})),
        };
        state.streams.entry(stream_id.clone()).or_default().push(message.clone());
        let idx = position as usize;
        if idx < state.all.len() {
            state.all[idx] = Some(message);
        }
    }

    pub fn set_max_age(&self, stream_id: &StreamId, max_age_seconds: Option<u32>) {
        let mut state = self.state.lock().unwrap();
        state.metadata.insert(
            stream_id.clone(),
            StreamMetadataResult {
                stream_id: stream_id.clone(),
                metadata_stream_version: 0,
                max_age_seconds,
                max_count: None,
                metadata_json: None,
            },
        );
    }

    pub fn purged_message_ids(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().purged.clone()
    }

    pub fn head_position(&self) -> i64 {
        self.state.lock().unwrap().next_position - 1
    }
}

impl StorageEngine for InMemoryEngine {
    type Error = FixtureError;

    async fn read_all_forwards_internal(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        _prefetch: bool,
        _cancel: CancellationToken,
    ) -> Result<RawAllPage, Self::Error> {
        let state = self.state.lock().unwrap();
        let available: Vec<&Message> = state
            .all
            .iter()
            .enumerate()
            .filter(|(pos, _)| *pos as i64 >= from_position_inclusive)
            .filter_map(|(_, m)| m.as_ref())
            .collect();

        let page: Vec<Message> = available.iter().take(max_count).map(|m| (*m).clone()).collect();
        let is_end = page.len() >= available.len();
        let next_position = if is_end {
            -1
        } else {
            page.last().map(|m| m.position + 1).unwrap_or(from_position_inclusive)
        };

        Ok(RawAllPage {
            from_position: from_position_inclusive,
            next_position,
            is_end,
            direction: Direction::Forwards,
            messages: page,
        })
    }

    async fn read_all_backwards_internal(
        &self,
        from_position_inclusive: i64,
        max_count: usize,
        _prefetch: bool,
        _cancel: CancellationToken,
    ) -> Result<RawAllPage, Self::Error> {
        let state = self.state.lock().unwrap();
        let ceiling = if from_position_inclusive == -1 {
            state.next_position - 1
        } else {
            from_position_inclusive
        };

        let mut available: Vec<&Message> = state
            .all
            .iter()
            .enumerate()
            .filter(|(pos, _)| *pos as i64 <= ceiling)
            .filter_map(|(_, m)| m.as_ref())
            .collect();
        available.reverse();

        let page: Vec<Message> = available.iter().take(max_count).map(|m| (*m).clone()).collect();
        let is_end = page.len() >= available.len();
        let next_position = if is_end {
            -1
        } else {
            page.last().map(|m| m.position - 1).unwrap_or(-1)
        };

        Ok(RawAllPage {
            from_position: from_position_inclusive,
            next_position,
            is_end,
            direction: Direction::Backwards,
            messages: page,
        })
    }

    async fn read_stream_forwards_internal(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        _prefetch: bool,
        _cancel: CancellationToken,
    ) -> Result<RawStreamPage, Self::Error> {
        let state = self.state.lock().unwrap();
        let Some(messages) = state.streams.get(stream_id) else {
            return Ok(RawStreamPage {
                stream_id: stream_id.clone(),
                status: ReadStreamStatus::NotFound,
                from_version: from_version_inclusive,
                next_version: from_version_inclusive,
                last_version: -1,
                last_position: -1,
                direction: Direction::Forwards,
                is_end: true,
                messages: Vec::new(),
            });
        };

        let available: Vec<&Message> = messages
            .iter()
            .filter(|m| m.stream_version as i64 >= from_version_inclusive)
            .collect();
        let page: Vec<Message> = available.iter().take(max_count).map(|m| (*m).clone()).collect();
        let is_end = page.len() >= available.len();
        let next_version = if is_end {
            messages.len() as i64
        } else {
            page.last().map(|m| m.stream_version as i64 + 1).unwrap_or(from_version_inclusive)
        };

        Ok(RawStreamPage {
            stream_id: stream_id.clone(),
            status: ReadStreamStatus::Ok,
            from_version: from_version_inclusive,
            next_version,
            last_version: messages.len() as i64 - 1,
            last_position: messages.last().map(|m| m.position).unwrap_or(-1),
            direction: Direction::Forwards,
            is_end,
            messages: page,
        })
    }

    async fn read_stream_backwards_internal(
        &self,
        stream_id: &StreamId,
        from_version_inclusive: i64,
        max_count: usize,
        _prefetch: bool,
        _cancel: CancellationToken,
    ) -> Result<RawStreamPage, Self::Error> {
        let state = self.state.lock().unwrap();
        let Some(messages) = state.streams.get(stream_id) else {
            return Ok(RawStreamPage {
                stream_id: stream_id.clone(),
                status: ReadStreamStatus::NotFound,
                from_version: from_version_inclusive,
                next_version: from_version_inclusive,
                last_version: -1,
                last_position: -1,
                direction: Direction::Backwards,
                is_end: true,
                messages: Vec::new(),
            });
        };

        let ceiling = if from_version_inclusive == -1 {
            messages.len() as i64 - 1
        } else {
            from_version_inclusive
        };

        let mut available: Vec<&Message> = messages.iter().filter(|m| m.stream_version as i64 <= ceiling).collect();
        available.reverse();

        let page: Vec<Message> = available.iter().take(max_count).map(|m| (*m).clone()).collect();
        let is_end = page.len() >= available.len();
        let next_version = if is_end {
            -1
        } else {
            page.last().map(|m| m.stream_version as i64 - 1).unwrap_or(-1)
        };

        Ok(RawStreamPage {
            stream_id: stream_id.clone(),
            status: ReadStreamStatus::Ok,
            from_version: from_version_inclusive,
            next_version,
            last_version: messages.len() as i64 - 1,
            last_position: messages.last().map(|m| m.position).unwrap_or(-1),
            direction: Direction::Backwards,
            is_end,
            messages: page,
        })
    }

    async fn read_head_position_internal(&self, _cancel: CancellationToken) -> Result<i64, Self::Error> {
        Ok(self.head_position())
    }

    async fn get_stream_metadata_internal(
        &self,
        stream_id: &StreamId,
        _cancel: CancellationToken,
    ) -> Result<StreamMetadataResult, Self::Error> {
        let state = self.state.lock().unwrap();
        Ok(state.metadata.get(stream_id).cloned().unwrap_or(StreamMetadataResult {
            stream_id: stream_id.clone(),
            metadata_stream_version: -1,
            max_age_seconds: None,
            max_count: None,
            metadata_json: None,
        }))
    }

    async fn purge_expired_message(&self, message: &Message) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.purged.push(message.message_id);
        Ok(())
    }
}
