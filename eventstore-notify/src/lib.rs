//! The head-position notifier (component E): polls a pull-only head-position
//! probe and turns it into a push-style "streams updated" signal.
//!
//! Deliberately decoupled from `eventstore-core`'s domain types — this crate
//! knows nothing about `StreamId` or `Message`, the same way the teacher's
//! `chron` crate knows nothing about baseball games. A `HeadPositionSource`
//! is any async probe that returns the current maximum committed position.

use hashbrown::HashMap;
use log::error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A pull-only probe for the current head position. Implemented by the
/// event store for its own engine; kept generic here so this crate stays
/// reusable outside the event store.
pub trait HeadPositionSource: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn read_head_position(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<i64, Self::Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct HeadPositionNotifierConfig {
    pub poll_interval: Duration,
}

impl Default for HeadPositionNotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// The event emitted when the head position advances. The per-stream count
/// map is a best-effort hint — subscribers must treat it as such and catch
/// up by reading, never trust it as authoritative.
#[derive(Debug, Clone, Default)]
pub struct StreamsUpdated {
    pub stream_counts: HashMap<String, u64>,
}

const BROADCAST_CAPACITY: usize = 256;

/// Runs a single background task that polls `source.read_head_position`
/// and multicasts a `StreamsUpdated` event whenever the head advances.
/// Late subscribers never see past events; slow subscribers may miss
/// events (bounded buffer, drop-oldest via `tokio::sync::broadcast`) but are
/// never allowed to block the publisher.
pub struct HeadPositionNotifier {
    sender: broadcast::Sender<StreamsUpdated>,
    initialized: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl HeadPositionNotifier {
    /// Spawns the polling task. `cancel` should be a child of the owning
    /// store's shutdown token so disposing the store stops the notifier.
    pub fn spawn<S: HeadPositionSource>(source: Arc<S>, config: HeadPositionNotifierConfig, cancel: CancellationToken) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let initialized = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(poll_loop(source, config, sender.clone(), initialized.clone(), cancel));

        Self {
            sender,
            initialized,
            task,
        }
    }

    /// A new receiver joining now; it will not see events emitted before
    /// this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamsUpdated> {
        self.sender.subscribe()
    }

    /// Resolves the "is_initialized" open question from `spec.md` §9: true
    /// once the first head-position read has completed successfully,
    /// regardless of whether it triggered an emission.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn poll_loop<S: HeadPositionSource>(
    source: Arc<S>,
    config: HeadPositionNotifierConfig,
    sender: broadcast::Sender<StreamsUpdated>,
    initialized: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut previous_head: i64 = -1;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let head = match read_head_reliably(source.as_ref(), &config, &cancel).await {
            Some(head) => head,
            None => return, // cancelled while retrying
        };

        initialized.store(true, Ordering::Release);

        if previous_head == -1 {
            // Prime the baseline without emitting: the first poll establishes
            // "current" rather than announcing an advance from nothing.
            previous_head = head;
        } else if head > previous_head {
            // A lagging or absent receiver must never block this loop;
            // `send` returning an error just means nobody is listening.
            let _ = sender.send(StreamsUpdated::default());
            previous_head = head;
        } else {
            if sleep_or_cancel(config.poll_interval, &cancel).await.is_none() {
                return;
            }
            continue;
        }
    }
}

/// Reads the head position, retrying indefinitely on engine error with
/// `poll_interval` backoff. A store that's temporarily unreachable must not
/// permanently silence subscribers. Returns `None` if cancelled mid-retry.
async fn read_head_reliably<S: HeadPositionSource>(
    source: &S,
    config: &HeadPositionNotifierConfig,
    cancel: &CancellationToken,
) -> Option<i64> {
    loop {
        let read = tokio::select! {
            result = source.read_head_position(cancel.clone()) => result,
            _ = cancel.cancelled() => return None,
        };

        match read {
            Ok(head) => return Some(head),
            Err(err) => {
                error!("head position poll failed, retrying in {:?}: {err}", config.poll_interval);
                sleep_or_cancel(config.poll_interval, cancel).await?;
            }
        }
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Option<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Some(()),
        _ = cancel.cancelled() => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicI64;

    struct StepSource {
        heads: Mutex<Vec<i64>>,
        calls: AtomicI64,
    }

    impl HeadPositionSource for StepSource {
        type Error = std::io::Error;

        async fn read_head_position(&self, _cancel: CancellationToken) -> Result<i64, Self::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut heads = self.heads.lock().unwrap();
            if heads.len() > 1 {
                Ok(heads.remove(0))
            } else {
                Ok(heads[0])
            }
        }
    }

    #[tokio::test]
    async fn first_poll_primes_without_emitting() {
        let source = Arc::new(StepSource {
            heads: Mutex::new(vec![5]),
            calls: AtomicI64::new(0),
        });
        let cancel = CancellationToken::new();
        let notifier = HeadPositionNotifier::spawn(
            source,
            HeadPositionNotifierConfig {
                poll_interval: Duration::from_millis(20),
            },
            cancel.clone(),
        );
        let mut rx = notifier.subscribe();

        tokio::time::timeout(Duration::from_millis(60), rx.recv()).await.unwrap_err();
        cancel.cancel();
    }

    #[tokio::test]
    async fn emits_when_head_advances() {
        let source = Arc::new(StepSource {
            heads: Mutex::new(vec![5, 5, 9]),
            calls: AtomicI64::new(0),
        });
        let cancel = CancellationToken::new();
        let notifier = HeadPositionNotifier::spawn(
            source,
            HeadPositionNotifierConfig {
                poll_interval: Duration::from_millis(10),
            },
            cancel.clone(),
        );
        let mut rx = notifier.subscribe();

        tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("should receive an update")
            .unwrap();
        cancel.cancel();
    }

    #[tokio::test]
    async fn is_initialized_after_first_successful_poll() {
        let source = Arc::new(StepSource {
            heads: Mutex::new(vec![0]),
            calls: AtomicI64::new(0),
        });
        let cancel = CancellationToken::new();
        let notifier = HeadPositionNotifier::spawn(
            source,
            HeadPositionNotifierConfig {
                poll_interval: Duration::from_millis(500),
            },
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(notifier.is_initialized());
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancellation_stops_the_poll_loop() {
        let source = Arc::new(StepSource {
            heads: Mutex::new(vec![1]),
            calls: AtomicI64::new(0),
        });
        let cancel = CancellationToken::new();
        let notifier = HeadPositionNotifier::spawn(
            source,
            HeadPositionNotifierConfig {
                poll_interval: Duration::from_millis(10),
            },
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(notifier.is_finished());
    }
}
