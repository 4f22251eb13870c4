use dashmap::DashMap;
use http::StatusCode;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::config::RateLimitConfig;
use super::key::DestinationKey;
use super::stats::{DestinationSnapshot, DestinationStats, RateLimiterStats};

/// Pacing state of one destination.
///
/// `turn` is held from computing the wait until the request is stamped, so
/// concurrent callers for the same destination queue up behind each other
/// instead of computing their wait against the same stale timestamp.
#[derive(Debug, Default)]
struct Destination {
    turn: tokio::sync::Mutex<()>,
    stats: Mutex<DestinationStats>,
}

/// Per-destination adaptive rate limiter.
///
/// Enforces a minimum delay between consecutive requests to the same
/// destination. The delay is escalated on throttling
/// ([`RateLimiter::report_throttled`]) and decays back towards the base
/// delay on success ([`RateLimiter::report_success`]).
///
/// Destinations are independent of each other: waiting for one never
/// delays another.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Base delays; starts from the configured ones, extended by `set_delay`
    delays: DashMap<String, Duration>,
    destinations: DashMap<DestinationKey, Arc<Destination>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let delays = config
            .delays
            .iter()
            .map(|(destination, delay)| (destination.to_lowercase(), *delay))
            .collect();
        Self {
            config,
            delays,
            destinations: DashMap::new(),
        }
    }

    fn destination(&self, key: &DestinationKey) -> Arc<Destination> {
        if let Some(destination) = self.destinations.get(key) {
            return Arc::clone(destination.value());
        }
        let entry = self.destinations.entry(key.clone()).or_default();
        Arc::clone(entry.value())
    }

    /// Configured delay of a destination, ignoring adaptation.
    ///
    /// Looks up the key itself, then the key without `www.`, with `www.`,
    /// the parent domain of a subdomain, and finally the default delay.
    #[must_use]
    pub fn base_delay(&self, destination: &str) -> Duration {
        self.base_delay_of(&DestinationKey::from(destination))
    }

    fn base_delay_of(&self, key: &DestinationKey) -> Duration {
        key.lookup_candidates()
            .iter()
            .find_map(|candidate| self.delays.get(candidate).map(|delay| *delay))
            .unwrap_or(self.config.default_delay)
    }

    /// Delay currently applied to a destination, including adaptation
    #[must_use]
    pub fn current_delay(&self, destination: &str) -> Duration {
        let key = DestinationKey::from(destination);
        let adapted = self
            .destinations
            .get(&key)
            .and_then(|destination| destination.stats.lock().current_delay);
        adapted.unwrap_or_else(|| self.base_delay_of(&key))
    }

    /// Set the base delay of a destination.
    /// Any adaptation of that exact destination is discarded.
    pub fn set_delay(&self, destination: &str, delay: Duration) {
        let key = DestinationKey::from(destination);
        if let Some(destination) = self.destinations.get(&key) {
            destination.stats.lock().current_delay = None;
        }
        log::debug!("Base delay of {key} set to {delay:?}");
        self.delays.insert(key.into_string(), delay);
    }

    /// Wait until a request to `destination` (a hostname or URL) is allowed,
    /// then record it. Returns how long the call waited.
    pub async fn acquire(&self, destination: &str) -> Duration {
        let key = DestinationKey::from(destination);
        let state = self.destination(&key);
        let _turn = state.turn.lock().await;

        let delay = self.effective_delay(&key, &state);
        let wait = {
            let mut stats = state.stats.lock();
            let wait = stats.wait_time(delay, Instant::now());
            if !wait.is_zero() {
                stats.blocked_count += 1;
            }
            wait
        };

        if !wait.is_zero() {
            log::debug!("Rate limit: waiting {wait:?} for {key}");
            tokio::time::sleep(wait).await;
        }

        state.stats.lock().record_request(Instant::now());
        wait
    }

    /// Record a request to `destination` only if it is allowed right now.
    ///
    /// Returns `false` if the request would have to wait, including while
    /// another caller is waiting for the same destination.
    pub fn try_acquire(&self, destination: &str) -> bool {
        let key = DestinationKey::from(destination);
        let state = self.destination(&key);
        let Ok(_turn) = state.turn.try_lock() else {
            return false;
        };

        let delay = self.effective_delay(&key, &state);
        let mut stats = state.stats.lock();
        let now = Instant::now();
        if !stats.wait_time(delay, now).is_zero() {
            return false;
        }
        stats.record_request(now);
        true
    }

    fn effective_delay(&self, key: &DestinationKey, state: &Destination) -> Duration {
        let adapted = state.stats.lock().current_delay;
        adapted.unwrap_or_else(|| self.base_delay_of(key))
    }

    /// Escalate the delay of a destination after it throttled a request.
    ///
    /// The new delay is the current one (or `min_delay`, if larger) times
    /// `increase_factor`, capped at `max_delay`. A base delay above
    /// `max_delay` is left as is.
    pub fn report_throttled(&self, destination: &str) {
        let key = DestinationKey::from(destination);
        let state = self.destination(&key);
        let base = self.base_delay_of(&key);

        let mut stats = state.stats.lock();
        let current = stats.current_delay.unwrap_or(base);
        let escalated = scale(current.max(self.config.min_delay), self.config.increase_factor)
            .map_or(self.config.max_delay, |delay| delay.min(self.config.max_delay))
            .max(current);
        stats.current_delay = Some(escalated);
        log::warn!("Rate limited by {key}, delay increased from {current:?} to {escalated:?}");
    }

    /// Decay an escalated delay towards the base delay.
    /// Never goes below the base delay and does nothing if not escalated.
    pub fn report_success(&self, destination: &str) {
        let key = DestinationKey::from(destination);
        let Some(state) = self.destinations.get(&key).map(|d| Arc::clone(d.value())) else {
            return;
        };
        let base = self.base_delay_of(&key);

        let mut stats = state.stats.lock();
        let Some(current) = stats.current_delay else {
            return;
        };
        if current <= base {
            stats.current_delay = None;
            return;
        }

        let decayed = scale(current, self.config.decrease_factor)
            .map_or(base, |delay| delay.min(current))
            .max(base);
        stats.current_delay = (decayed > base).then_some(decayed);
        log::debug!("Delay of {key} decreased from {current:?} to {decayed:?}");
    }

    /// Feed back the status code of a response from `destination`.
    ///
    /// `429 Too Many Requests` escalates, any success decays, everything
    /// else is ignored.
    pub fn report_status(&self, destination: &str, status: StatusCode) {
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.report_throttled(destination);
        } else if status.is_success() {
            self.report_success(destination);
        }
    }

    /// Forget request counters and timestamps of every destination.
    /// Adapted delays are kept.
    pub fn reset_stats(&self) {
        for destination in &self.destinations {
            let mut stats = destination.stats.lock();
            let current_delay = stats.current_delay;
            *stats = DestinationStats {
                current_delay,
                ..DestinationStats::default()
            };
        }
    }

    /// Snapshot of rate limiter statistics
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut result = RateLimiterStats::default();

        for entry in &self.destinations {
            let stats = *entry.value().stats.lock();
            let base_delay = self.base_delay_of(entry.key());

            result.total_requests += stats.total_requests;
            result.total_blocked += stats.blocked_count;
            result.destinations.insert(
                entry.key().to_string(),
                DestinationSnapshot {
                    total_requests: stats.total_requests,
                    blocked_count: stats.blocked_count,
                    base_delay,
                    current_delay: stats.current_delay.unwrap_or(base_delay),
                    seconds_since_last_request: stats
                        .last_request_at
                        .map(|at| now.saturating_duration_since(at).as_secs_f64()),
                },
            );
        }
        result.total_destinations = result.destinations.len();
        result
    }
}

/// `delay * factor`, or `None` if the product is negative, NaN or does not
/// fit a `Duration`
fn scale(delay: Duration, factor: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).ok()
}
