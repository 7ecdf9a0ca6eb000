use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Leading character that marks a stream as a system stream (`$foo`).
/// Preserved bit-exactly for compatibility with existing on-disk data.
const SYSTEM_STREAM_PREFIX: char = '$';

/// Well-known system stream where purged stream tombstones accumulate.
pub const DELETED_STREAM_ID: &str = "$deleted";

/// An opaque, non-empty stream identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Result<Self, StreamIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(StreamIdError::Empty);
        }
        Ok(Self(id))
    }

    pub fn deleted() -> Self {
        Self(DELETED_STREAM_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for any stream whose id begins with `$`. System streams are
    /// exempt from metadata/expiry processing.
    pub fn is_system(&self) -> bool {
        self.0.starts_with(SYSTEM_STREAM_PREFIX)
    }

    pub fn is_deleted_stream(&self) -> bool {
        self.0 == DELETED_STREAM_ID
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamIdError {
    #[error("stream id must not be empty")]
    Empty,
}

/// A single immutable message on a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub stream_id: StreamId,
    pub stream_version: u32,
    pub position: i64,
    pub message_id: Uuid,
    pub message_type: String,
    pub created_utc: DateTime<Utc>,
    /// `None` when the page was read with `prefetch = false` and the
    /// engine deferred materializing it.
    pub json_metadata: Option<Value>,
    pub json_data: Option<Value>,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forwards,
    Backwards,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStreamStatus {
    Ok,
    NotFound,
}

/// Per-stream retention metadata. The core only consumes `max_age_seconds`;
/// `max_count` enforcement belongs to the storage engine.
#[derive(Debug, Clone)]
pub struct StreamMetadataResult {
    pub stream_id: StreamId,
    pub metadata_stream_version: i64,
    pub max_age_seconds: Option<u32>,
    pub max_count: Option<u32>,
    pub metadata_json: Option<Value>,
}

/// The raw page shape returned by a `StorageEngine`, before gap
/// reconciliation or expiry filtering.
#[derive(Debug, Clone)]
pub struct RawStreamPage {
    pub stream_id: StreamId,
    pub status: ReadStreamStatus,
    pub from_version: i64,
    pub next_version: i64,
    pub last_version: i64,
    pub last_position: i64,
    pub direction: Direction,
    pub is_end: bool,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct RawAllPage {
    pub from_position: i64,
    pub next_position: i64,
    pub is_end: bool,
    pub direction: Direction,
    pub messages: Vec<Message>,
}
