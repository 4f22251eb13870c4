//! Background health monitoring of name resolution.
//!
//! [`HealthMonitor`] probes a set of reference domains on an interval and
//! maintains a three-state [`MonitorStatus`]. Subscribers are notified on
//! status changes, which is how the
//! [`Coordinator`](crate::coordinator::Coordinator) pauses and resumes work.

#![allow(clippy::module_inception)]

mod callbacks;
mod config;
mod history;
mod monitor;
mod state;

pub use callbacks::{CheckCallback, StateCallback};
pub use config::{DEFAULT_DOMAINS, MonitorConfig};
pub use history::HealthCheckResult;
pub use monitor::{HealthMonitor, MonitorStats};
pub use state::MonitorStatus;
