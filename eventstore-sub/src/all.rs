use crate::callback::{CaughtUpCallback, DropCallback, DropReason, MessageCallback};
use crate::config::SubscriptionConfig;
use crate::drive::{run_subscription, SubscriptionKind};
use crate::state::{StateCell, SubscriptionState};
use eventstore_core::{Message, ReadonlyStreamStore, StorageEngine};
use eventstore_notify::StreamsUpdated;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct AllKind {
    continue_after_position: Option<i64>,
}

impl<E: StorageEngine> SubscriptionKind<E> for AllKind {
    async fn initial_cursor(&self, store: &ReadonlyStreamStore<E>, cancel: CancellationToken) -> Result<i64, DropReason> {
        if let Some(after) = self.continue_after_position {
            return Ok(after + 1);
        }
        let head = store.read_head_position(cancel).await.map_err(DropReason::EngineError)?;
        Ok(head + 1)
    }

    async fn drain_page(
        &self,
        store: &ReadonlyStreamStore<E>,
        cursor: i64,
        config: &SubscriptionConfig,
        cancel: CancellationToken,
    ) -> Result<(Vec<Message>, i64, bool), DropReason> {
        let page = store
            .read_all_forwards(cursor, config.max_count, config.prefetch, cancel)
            .await
            .map_err(DropReason::EngineError)?;
        Ok((page.messages, page.next_position, page.is_end))
    }

    fn log_label(&self) -> String {
        "all-stream subscription".to_string()
    }
}

/// A live handle to a running all-stream subscription.
pub struct AllSubscriptionHandle {
    cancel: CancellationToken,
    state: Arc<StateCell>,
    task: JoinHandle<()>,
}

impl AllSubscriptionHandle {
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
pub fn subscribe_to_all<E: StorageEngine>(
    store: ReadonlyStreamStore<E>,
    continue_after_position: Option<i64>,
    updates: broadcast::Receiver<StreamsUpdated>,
    config: SubscriptionConfig,
    on_message: MessageCallback,
    on_drop: Option<DropCallback>,
    on_caught_up: Option<CaughtUpCallback>,
    parent_cancel: CancellationToken,
) -> AllSubscriptionHandle {
    let cancel = parent_cancel.child_token();
    let state = Arc::new(StateCell::new(SubscriptionState::Initializing));
    let kind = AllKind { continue_after_position };

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

    AllSubscriptionHandle { cancel, state, task }
}
