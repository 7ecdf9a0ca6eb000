use crate::callback::{CaughtUpCallback, ControlFlow, DropCallback, DropReason, MessageCallback};
use crate::config::SubscriptionConfig;
use crate::state::{StateCell, SubscriptionState};
use eventstore_core::{Message, ReadonlyStreamStore, StorageEngine};
use eventstore_notify::StreamsUpdated;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// The two subscription kinds differ only in which façade method they drain
/// and how they pick their starting cursor; everything else (the state
/// machine, live-follow, drop handling) is shared here.
pub(crate) trait SubscriptionKind<E: StorageEngine>: Send {
    /// `continue_after` exclusive, or the current head if `None`.
    fn initial_cursor(
        &self,
        store: &ReadonlyStreamStore<E>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<i64, DropReason>> + Send;

    /// Reads one page starting at `cursor`, returning its messages and the
    /// cursor/end-of-stream state to continue from.
    fn drain_page(
        &self,
        store: &ReadonlyStreamStore<E>,
        cursor: i64,
        config: &SubscriptionConfig,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(Vec<Message>, i64, bool), DropReason>> + Send;

    fn log_label(&self) -> String;
}

enum DrainOutcome {
    CaughtUp,
    Stopped,
}

/// Drains pages until caught up. `first_page`, when given, is consumed
/// before any further read — used by the live-follow loop to avoid
/// re-reading the page it already fetched while probing for new work.
async fn drain<E: StorageEngine, K: SubscriptionKind<E>>(
    kind: &K,
    store: &ReadonlyStreamStore<E>,
    cursor: &mut i64,
    config: &SubscriptionConfig,
    on_message: &MessageCallback,
    cancel: &CancellationToken,
    mut first_page: Option<(Vec<Message>, i64, bool)>,
) -> Result<DrainOutcome, DropReason> {
    loop {
        if cancel.is_cancelled() {
            return Err(DropReason::Disposed);
        }

        let (messages, next_cursor, is_end) = match first_page.take() {
            Some(page) => page,
            None => kind.drain_page(store, *cursor, config, cancel.clone()).await?,
        };

        for message in messages {
            let flow = on_message(message).await.map_err(DropReason::SubscriberError)?;
            if flow == ControlFlow::Stop {
                return Ok(DrainOutcome::Stopped);
            }
        }

        *cursor = next_cursor;

        if is_end {
            return Ok(DrainOutcome::CaughtUp);
        }
    }
}

/// The shared subscription task body: catch up, subscribe to the notifier,
/// then alternate between parking and draining until disposed or dropped.
/// Every path out of this loop resolves to a `DropReason` — a live
/// subscription never returns any other way.
pub(crate) async fn run_subscription<E: StorageEngine, K: SubscriptionKind<E>>(
    kind: K,
    store: ReadonlyStreamStore<E>,
    mut updates: broadcast::Receiver<StreamsUpdated>,
    config: SubscriptionConfig,
    on_message: MessageCallback,
    on_drop: Option<DropCallback>,
    on_caught_up: Option<CaughtUpCallback>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
) {
    let label = match &config.name {
        Some(name) => format!("{} [{name}]", kind.log_label()),
        None => kind.log_label(),
    };
    state.set(SubscriptionState::Initializing);

    let reason = run_until_dropped(&kind, &store, &mut updates, &config, &on_message, &on_caught_up, &state, &cancel).await;

    match &reason {
        DropReason::Disposed => {
            debug!("{label}: disposed");
            state.set(SubscriptionState::Disposed);
        }
        other => {
            warn!("{label}: subscription dropped: {other}");
            state.set(SubscriptionState::Dropped);
        }
    }

    if let Some(on_drop) = on_drop {
        on_drop(reason).await;
    }
}

async fn run_until_dropped<E: StorageEngine, K: SubscriptionKind<E>>(
    kind: &K,
    store: &ReadonlyStreamStore<E>,
    updates: &mut broadcast::Receiver<StreamsUpdated>,
    config: &SubscriptionConfig,
    on_message: &MessageCallback,
    on_caught_up: &Option<CaughtUpCallback>,
    state: &Arc<StateCell>,
    cancel: &CancellationToken,
) -> DropReason {
    let mut cursor = match kind.initial_cursor(store, cancel.clone()).await {
        Ok(c) => c,
        Err(reason) => return reason,
    };

    state.set(SubscriptionState::CatchingUp);
    match drain(kind, store, &mut cursor, config, on_message, cancel, None).await {
        Ok(DrainOutcome::Stopped) => return DropReason::Disposed,
        Ok(DrainOutcome::CaughtUp) => {}
        Err(reason) => return reason,
    }

    state.set(SubscriptionState::Subscribed);
    if let Some(cb) = on_caught_up {
        cb(true).await;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return DropReason::Disposed,
            event = updates.recv() => {
                match event {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("{}: missed {skipped} notifier events, catching up anyway", kind.log_label());
                    }
                    Err(broadcast::error::RecvError::Closed) => return DropReason::NotifierTerminated,
                }
            }
            _ = tokio::time::sleep(config.live_follow_wake_interval) => {
                // Fallback wake in case a broadcast event was missed entirely.
            }
        }

        // The wake may be spurious for this subscription (e.g. the all-stream
        // head advanced because a different stream got a new message, or a
        // fallback timer tick found nothing new). Probe one page before
        // treating this as a real catching-up/subscribed edge.
        let probe = match kind.drain_page(store, cursor, config, cancel.clone()).await {
            Ok(page) => page,
            Err(reason) => return reason,
        };

        if probe.0.is_empty() && probe.2 {
            continue;
        }

        if let Some(cb) = on_caught_up {
            cb(false).await;
        }

        state.set(SubscriptionState::CatchingUp);
        match drain(kind, store, &mut cursor, config, on_message, cancel, Some(probe)).await {
            Ok(DrainOutcome::Stopped) => return DropReason::Disposed,
            Ok(DrainOutcome::CaughtUp) => {}
            Err(reason) => return reason,
        }

        state.set(SubscriptionState::Subscribed);
        if let Some(cb) = on_caught_up {
            cb(true).await;
        }
    }
}
