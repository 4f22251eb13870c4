use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, IntoStaticStr};
use tokio::time::Instant;

use super::lookup::Lookup;
use crate::types::percentage;

/// How the resolver picks the next provider to query
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RotationStrategy {
    /// Cycle through providers, skipping ineligible ones
    #[default]
    RoundRobin,
    /// Pick the eligible provider with the best success rate
    HealthBased,
    /// Pick uniformly among eligible providers
    Random,
}

/// Thresholds deciding whether a provider may be selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HealthPolicy {
    pub(crate) failure_threshold: u32,
    pub(crate) recovery_window: Duration,
}

/// Query history of a single upstream provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderHealth {
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Time of the most recent failure
    pub last_failure_at: Option<Instant>,
    /// Time of the most recent success
    pub last_success_at: Option<Instant>,
    /// All queries sent to this provider
    pub total_queries: u64,
    /// All failed queries
    pub total_failures: u64,
}

impl ProviderHealth {
    pub(crate) fn record_success(&mut self, now: Instant) {
        self.consecutive_failures = 0;
        self.last_success_at = Some(now);
        self.total_queries += 1;
    }

    pub(crate) fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.last_failure_at = Some(now);
        self.total_queries += 1;
        self.total_failures += 1;
    }

    /// A provider is eligible below the failure threshold, or once the
    /// recovery window has passed since its last failure.
    pub(crate) fn is_eligible(&self, policy: HealthPolicy, now: Instant) -> bool {
        if self.consecutive_failures < policy.failure_threshold {
            return true;
        }
        self.last_failure_at
            .is_none_or(|at| now.saturating_duration_since(at) > policy.recovery_window)
    }

    /// Share of successful queries, `1.0` for an unused provider
    #[allow(clippy::cast_precision_loss)]
    fn success_ratio(&self) -> f64 {
        if self.total_queries == 0 {
            return 1.0;
        }
        1.0 - self.total_failures as f64 / self.total_queries as f64
    }
}

/// A configured upstream together with its health
#[derive(Debug)]
pub(crate) struct Provider {
    pub(crate) address: String,
    pub(crate) lookup: Arc<dyn Lookup>,
    health: Mutex<ProviderHealth>,
}

impl Provider {
    pub(crate) fn new(address: String, lookup: Arc<dyn Lookup>) -> Self {
        Self {
            address,
            lookup,
            health: Mutex::new(ProviderHealth::default()),
        }
    }

    pub(crate) fn health(&self) -> ProviderHealth {
        *self.health.lock()
    }

    pub(crate) fn record_success(&self) {
        self.health.lock().record_success(Instant::now());
    }

    pub(crate) fn record_failure(&self) {
        self.health.lock().record_failure(Instant::now());
    }

    fn is_eligible(&self, policy: HealthPolicy, now: Instant) -> bool {
        self.health.lock().is_eligible(policy, now)
    }

    pub(crate) fn stats(&self, policy: HealthPolicy) -> ProviderStats {
        let health = self.health();
        ProviderStats {
            address: self.address.clone(),
            total_queries: health.total_queries,
            failures: health.total_failures,
            success_rate: percentage(
                health.total_queries - health.total_failures,
                health.total_queries,
            ),
            is_healthy: health.is_eligible(policy, Instant::now()),
        }
    }
}

/// Statistics of a single provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Provider address as configured
    pub address: String,
    /// All queries sent to this provider
    pub total_queries: u64,
    /// Failed queries
    pub failures: u64,
    /// Success rate as a formatted percentage
    pub success_rate: String,
    /// Whether the provider is currently eligible for selection
    pub is_healthy: bool,
}

/// Provider selection according to a [`RotationStrategy`]
#[derive(Debug)]
pub(crate) struct Rotation {
    strategy: RotationStrategy,
    next: Mutex<usize>,
}

impl Rotation {
    pub(crate) const fn new(strategy: RotationStrategy) -> Self {
        Self {
            strategy,
            next: parking_lot::const_mutex(0),
        }
    }

    pub(crate) const fn strategy(&self) -> RotationStrategy {
        self.strategy
    }

    /// Index the next round-robin selection starts from
    pub(crate) fn current_index(&self) -> usize {
        *self.next.lock()
    }

    /// Pick the index of the provider to query next.
    /// `None` means no provider should be queried for this attempt.
    pub(crate) fn select(&self, providers: &[Provider], policy: HealthPolicy) -> Option<usize> {
        if providers.is_empty() {
            return None;
        }
        let now = Instant::now();
        match self.strategy {
            RotationStrategy::RoundRobin => self.next_round_robin(providers, policy, now),
            RotationStrategy::HealthBased => Some(healthiest(providers, policy, now)),
            RotationStrategy::Random => {
                let eligible: Vec<usize> = (0..providers.len())
                    .filter(|&i| providers[i].is_eligible(policy, now))
                    .collect();
                eligible.choose(&mut rand::rng()).copied()
            }
        }
    }

    fn next_round_robin(
        &self,
        providers: &[Provider],
        policy: HealthPolicy,
        now: Instant,
    ) -> Option<usize> {
        let len = providers.len();
        let mut next = self.next.lock();
        let start = *next % len;
        *next = start;

        for _ in 0..len {
            let index = *next;
            *next = (index + 1) % len;
            if providers[index].is_eligible(policy, now) {
                return Some(index);
            }
        }

        // Nobody is eligible; hand out the provider we started at anyway
        *next = (start + 1) % len;
        Some(start)
    }
}

/// Best success ratio among eligible providers, the first provider if none
/// is eligible. Ties go to the provider configured first.
fn healthiest(providers: &[Provider], policy: HealthPolicy, now: Instant) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (index, provider) in providers.iter().enumerate() {
        let health = provider.health();
        if !health.is_eligible(policy, now) {
            continue;
        }
        let ratio = health.success_ratio();
        if best.is_none_or(|(_, best_ratio)| ratio > best_ratio) {
            best = Some((index, ratio));
        }
    }
    best.map_or(0, |(index, _)| index)
}
