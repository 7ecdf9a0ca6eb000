mod cache;
mod clock;
mod engine;
mod error;
mod filter;
mod gap;
mod model;
mod store;

pub use cache::MetadataAgeCache;
pub use clock::{Clock, SystemClock};
pub use engine::StorageEngine;
pub use error::{StoreError, StoreResult};
pub use model::{
    Direction, Message, RawAllPage, RawStreamPage, ReadStreamStatus, StreamId, StreamIdError,
    StreamMetadataResult, DELETED_STREAM_ID,
};
pub use store::{ReadAllPage, ReadStreamPage, ReadonlyStreamStore, StoreConfig};
