use std::time::Duration;

/// Knobs shared by stream and all-stream subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Page size used while draining during catch-up and live-follow.
    pub max_count: usize,
    pub prefetch: bool,
    /// Periodic wake used as a fallback for a missed or lagged broadcast
    /// event from the notifier; not the primary wake-up mechanism.
    pub live_follow_wake_interval: Duration,
    /// Purely for logging context.
    pub name: Option<String>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_count: 100,
            prefetch: true,
            live_follow_wake_interval: Duration::from_secs(5),
            name: None,
        }
    }
}
