use std::sync::atomic::{AtomicU8, Ordering};

/// `Initializing -> CatchingUp -> Subscribed -> Disposed`, with `Dropped`
/// reachable from any live state on fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    Initializing = 0,
    CatchingUp = 1,
    Subscribed = 2,
    Disposed = 3,
    Dropped = 4,
}

impl SubscriptionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initializing,
            1 => Self::CatchingUp,
            2 => Self::Subscribed,
            3 => Self::Disposed,
            _ => Self::Dropped,
        }
    }
}

/// Shared, lock-free handle on a subscription's current state, readable from
/// the owning `*SubscriptionHandle` without synchronising with the task.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: SubscriptionState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: SubscriptionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.get(), SubscriptionState::Disposed | SubscriptionState::Dropped)
    }
}
