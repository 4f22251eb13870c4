use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reference domains probed by each health check cycle
pub const DEFAULT_DOMAINS: [&str; 3] = ["google.com", "cloudflare.com", "wikipedia.org"];

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RECOVERY_THRESHOLD: u32 = 2;
const DEFAULT_HISTORY_SIZE: usize = 100;

/// Configuration of the [`HealthMonitor`](crate::monitor::HealthMonitor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Wait between the end of one cycle and the start of the next
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout of a single probe
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Consecutive failed cycles before the monitor turns unhealthy
    pub failure_threshold: u32,

    /// Consecutive successful cycles before the monitor is healthy again
    pub recovery_threshold: u32,

    /// Reference domains to probe
    pub domains: Vec<String>,

    /// Number of probe results kept in memory
    pub history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_threshold: DEFAULT_RECOVERY_THRESHOLD,
            domains: DEFAULT_DOMAINS.iter().map(ToString::to_string).collect(),
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}
