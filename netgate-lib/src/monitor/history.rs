use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::SystemTime;

/// Number of most recent results the summary statistics look at
const RECENT_WINDOW: usize = 10;

/// Outcome of probing a single reference domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Probed domain
    pub domain: String,
    /// Whether the domain resolved within the timeout
    pub success: bool,
    /// Time until the probe finished (the timeout if it timed out)
    pub latency_ms: f64,
    /// Failure reason
    pub error: Option<String>,
    /// When the probe finished
    #[serde(with = "humantime_serde")]
    pub timestamp: SystemTime,
}

/// Probe results, oldest first, bounded to the newest `capacity` entries
#[derive(Debug)]
pub(crate) struct History {
    results: VecDeque<HealthCheckResult>,
    capacity: usize,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            results: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, result: HealthCheckResult) {
        if self.capacity == 0 {
            return;
        }
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(result);
    }

    pub(crate) fn len(&self) -> usize {
        self.results.len()
    }

    /// The newest `limit` results, oldest first
    pub(crate) fn newest(&self, limit: usize) -> Vec<HealthCheckResult> {
        let skip = self.results.len().saturating_sub(limit);
        self.results.iter().skip(skip).cloned().collect()
    }

    /// Success rate and average successful latency of the recent results
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn recent_summary(&self) -> (f64, f64) {
        let skip = self.results.len().saturating_sub(RECENT_WINDOW);
        let recent: Vec<&HealthCheckResult> = self.results.iter().skip(skip).collect();
        if recent.is_empty() {
            return (0.0, 0.0);
        }

        let latencies: Vec<f64> = recent
            .iter()
            .filter(|result| result.success)
            .map(|result| result.latency_ms)
            .collect();
        let success_rate = latencies.len() as f64 / recent.len() as f64 * 100.0;
        let average_latency = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        (success_rate, average_latency)
    }
}
