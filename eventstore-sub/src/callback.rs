use eventstore_core::Message;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type CallbackError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Stop,
}

/// Why a subscription transitioned to `Dropped`.
#[derive(Debug, thiserror::Error)]
pub enum DropReason {
    #[error("subscription was disposed")]
    Disposed,
    #[error("storage engine error: {0}")]
    EngineError(#[source] eventstore_core::StoreError),
    #[error("subscriber callback failed: {0}")]
    SubscriberError(#[source] CallbackError),
    #[error("head-position notifier terminated")]
    NotifierTerminated,
}

/// Invoked once per delivered message. The runtime awaits this future before
/// delivering the next message — this is the back-pressure mechanism; there
/// is no unbounded internal queue.
pub type MessageCallback = Arc<dyn Fn(Message) -> BoxFuture<'static, Result<ControlFlow, CallbackError>> + Send + Sync>;

/// Invoked exactly once when a subscription leaves a live state.
pub type DropCallback = Arc<dyn Fn(DropReason) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked on edge changes of the caught-up/draining boundary: `true` when
/// parking after a successful catch-up, `false` when starting a new drain.
pub type CaughtUpCallback = Arc<dyn Fn(bool) -> BoxFuture<'static, ()> + Send + Sync>;
