//! Subscription runtime (component F): per-stream and all-stream
//! subscriptions that bridge catch-up reads with live notifications while
//! preserving strict per-subscription ordering and at-least-once delivery.

mod all;
mod callback;
mod config;
mod drive;
mod source;
mod state;
mod stream;

pub use all::{subscribe_to_all, AllSubscriptionHandle};
pub use callback::{BoxFuture, CallbackError, CaughtUpCallback, ControlFlow, DropCallback, DropReason, MessageCallback};
pub use config::SubscriptionConfig;
pub use source::StoreHeadPositionSource;
pub use state::SubscriptionState;
pub use stream::{subscribe_to_stream, StreamSubscriptionHandle};
