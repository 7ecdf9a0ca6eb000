use chrono::{DateTime, Utc};

/// Pluggable clock so the metadata cache and expiry filter never read a
/// hard-wired wall clock; tests substitute a fake to get deterministic
/// expiry behavior.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
