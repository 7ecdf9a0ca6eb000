use crate::callback::{CaughtUpCallback, DropCallback, DropReason, MessageCallback};
use crate::config::SubscriptionConfig;
use crate::drive::{run_subscription, SubscriptionKind};
use crate::state::{StateCell, SubscriptionState};
use eventstore_core::{Message, ReadonlyStreamStore, StorageEngine, StreamId};
use eventstore_notify::StreamsUpdated;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct StreamKind {
    stream_id: StreamId,
    continue_after_version: Option<i64>,
}

impl<E: StorageEngine> SubscriptionKind<E> for StreamKind {
    async fn initial_cursor(&self, store: &ReadonlyStreamStore<E>, cancel: CancellationToken) -> Result<i64, DropReason> {
        if let Some(after) = self.continue_after_version {
            return Ok(after + 1);
        }
        let probe = store
            .read_stream_forwards(&self.stream_id, 0, 1, false, cancel)
            .await
            .map_err(DropReason::EngineError)?;
        Ok(probe.last_version + 1)
    }

    async fn drain_page(
        &self,
        store: &ReadonlyStreamStore<E>,
        cursor: i64,
        config: &SubscriptionConfig,
        cancel: CancellationToken,
    ) -> Result<(Vec<Message>, i64, bool), DropReason> {
        let page = store
            .read_stream_forwards(&self.stream_id, cursor, config.max_count, config.prefetch, cancel)
            .await
            .map_err(DropReason::EngineError)?;
        Ok((page.messages, page.next_version, page.is_end))
    }

    fn log_label(&self) -> String {
        format!("stream subscription [{}]", self.stream_id)
    }
}

/// A live handle to a running stream subscription. Dropping this handle does
/// not stop the subscription — call `dispose()` explicitly, or dispose the
/// owning store.
pub struct StreamSubscriptionHandle {
    cancel: CancellationToken,
    state: Arc<StateCell>,
    task: JoinHandle<()>,
}

impl StreamSubscriptionHandle {
    pub fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn subscribe_to_stream<E: StorageEngine>(
    store: ReadonlyStreamStore<E>,
    stream_id: StreamId,
    continue_after_version: Option<i64>,
    updates: broadcast::Receiver<StreamsUpdated>,
    config: SubscriptionConfig,
    on_message: MessageCallback,
    on_drop: Option<DropCallback>,
    on_caught_up: Option<CaughtUpCallback>,
    parent_cancel: CancellationToken,
) -> StreamSubscriptionHandle {
    let cancel = parent_cancel.child_token();
    let state = Arc::new(StateCell::new(SubscriptionState::Initializing));
    let kind = StreamKind {
        stream_id,
        continue_after_version,
    };

    let task = tokio::spawn(run_subscription(
        kind,
        store,
        updates,
        config,
        on_message,
        on_drop,
        on_caught_up,
        state.clone(),
        cancel.clone(),
    ));

    StreamSubscriptionHandle { cancel, state, task }
}
