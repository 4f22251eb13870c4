use serde::Serialize;
use strum::{Display, IntoStaticStr};

/// Aggregate health of name resolution
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MonitorStatus {
    /// Enough consecutive cycles succeeded
    #[default]
    Healthy,
    /// The latest cycle failed, but not often enough to be unhealthy
    Degraded,
    /// Consecutive failed cycles reached the failure threshold
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Thresholds {
    pub(crate) failure: u32,
    pub(crate) recovery: u32,
}

/// Status plus the consecutive cycle counters it is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MonitorState {
    pub(crate) status: MonitorStatus,
    pub(crate) consecutive_failures: u32,
    pub(crate) consecutive_successes: u32,
    pub(crate) transitions: u64,
}

impl MonitorState {
    /// Account for the aggregate outcome of one cycle.
    ///
    /// Returns the previous status if the status changed.
    pub(crate) fn record(&mut self, success: bool, thresholds: Thresholds) -> Option<MonitorStatus> {
        if success {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
        }

        let next = if self.consecutive_failures >= thresholds.failure {
            MonitorStatus::Unhealthy
        } else if self.consecutive_failures >= 1 {
            MonitorStatus::Degraded
        } else if self.consecutive_successes >= thresholds.recovery {
            MonitorStatus::Healthy
        } else {
            self.status
        };

        if next == self.status {
            return None;
        }
        self.transitions += 1;
        Some(std::mem::replace(&mut self.status, next))
    }
}
