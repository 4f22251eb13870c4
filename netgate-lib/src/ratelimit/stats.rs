use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Pacing state of a single destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DestinationStats {
    /// When the last request was let through
    pub(crate) last_request_at: Option<Instant>,
    /// Requests let through
    pub(crate) total_requests: u64,
    /// Requests that had to wait
    pub(crate) blocked_count: u64,
    /// Adapted delay, `None` while it equals the base delay
    pub(crate) current_delay: Option<Duration>,
}

impl DestinationStats {
    /// Remaining wait before the next request may go out
    pub(crate) fn wait_time(&self, delay: Duration, now: Instant) -> Duration {
        self.last_request_at.map_or(Duration::ZERO, |at| {
            delay.saturating_sub(now.saturating_duration_since(at))
        })
    }

    pub(crate) fn record_request(&mut self, now: Instant) {
        self.last_request_at = Some(now);
        self.total_requests += 1;
    }
}

/// Statistics of one destination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationSnapshot {
    /// Requests let through
    pub total_requests: u64,
    /// Requests that had to wait
    pub blocked_count: u64,
    /// Configured delay
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Delay currently applied, including adaptation
    #[serde(with = "humantime_serde")]
    pub current_delay: Duration,
    /// Seconds since the last request, if there was one
    pub seconds_since_last_request: Option<f64>,
}

/// Statistics of a [`RateLimiter`](crate::ratelimit::RateLimiter)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimiterStats {
    /// Destinations seen so far
    pub total_destinations: usize,
    /// Requests let through across all destinations
    pub total_requests: u64,
    /// Requests that had to wait across all destinations
    pub total_blocked: u64,
    /// Per-destination statistics
    pub destinations: BTreeMap<String, DestinationSnapshot>,
}
