use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::callbacks::{self, Subscribers};
use super::config::MonitorConfig;
use super::history::{HealthCheckResult, History};
use super::state::{MonitorState, MonitorStatus, Thresholds};
use crate::dns::{HickoryLookup, Lookup};

/// Periodic health check of name resolution.
///
/// Every cycle probes all reference domains and counts as successful if a
/// strict majority of them resolved. The status follows the consecutive
/// cycle outcomes:
///
/// - failures at or above the failure threshold: [`MonitorStatus::Unhealthy`]
/// - at least one failure: [`MonitorStatus::Degraded`]
/// - successes at or above the recovery threshold: [`MonitorStatus::Healthy`]
///
/// Subscribers are called on actual status changes only. They run in their
/// own tasks, so a panicking subscriber is logged and the loop carries on.
/// Cycles never overlap: a [`HealthMonitor::check_now`] during a background
/// cycle waits for it, so subscribers see transitions in the order they
/// happened. Subscribers must therefore not call [`HealthMonitor::stop`] or
/// [`HealthMonitor::check_now`] on the monitor that notifies them, as both
/// wait for the notifying cycle to finish.
#[derive(Debug)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<MonitorTask>>,
}

#[derive(Debug)]
struct MonitorTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct MonitorInner {
    config: MonitorConfig,
    lookup: Arc<dyn Lookup>,
    state: Mutex<MonitorState>,
    history: Mutex<History>,
    subscribers: Mutex<Subscribers>,
    /// Held for the whole of a cycle
    cycle: AsyncMutex<()>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl HealthMonitor {
    /// Create a monitor probing through the system resolver
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let lookup = Arc::new(HickoryLookup::system(config.timeout));
        Self::with_lookup(config, lookup)
    }

    /// Create a monitor probing through a custom [`Lookup`]
    #[must_use]
    pub fn with_lookup(config: MonitorConfig, lookup: Arc<dyn Lookup>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                history: Mutex::new(History::new(config.history_size)),
                config,
                lookup,
                state: Mutex::new(MonitorState::default()),
                subscribers: Mutex::new(Subscribers::default()),
                cycle: AsyncMutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Call `callback` whenever the status turns unhealthy
    pub fn on_unhealthy<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback = callbacks::state_callback(callback);
        self.inner.subscribers.lock().unhealthy.push(callback);
    }

    /// Call `callback` whenever the status turns degraded
    pub fn on_degraded<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback = callbacks::state_callback(callback);
        self.inner.subscribers.lock().degraded.push(callback);
    }

    /// Call `callback` whenever the status turns healthy again
    pub fn on_recovered<F, Fut>(&self, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback = callbacks::state_callback(callback);
        self.inner.subscribers.lock().recovered.push(callback);
    }

    /// Call `callback` with every single probe result
    pub fn on_each_check<F, Fut>(&self, callback: F)
    where
        F: Fn(HealthCheckResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback = callbacks::check_callback(callback);
        self.inner.subscribers.lock().each_check.push(callback);
    }

    /// Start the background loop. Does nothing if it is already running.
    ///
    /// The first cycle runs immediately.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let (shutdown, receiver) = oneshot::channel();
        let handle = tokio::spawn(Arc::clone(&self.inner).run(receiver));
        *task = Some(MonitorTask { shutdown, handle });
        log::info!("Health monitor started");
    }

    /// Stop the background loop and wait until it has exited.
    /// Does nothing if it is not running.
    ///
    /// A pending interval wait is cancelled right away, a running cycle
    /// is allowed to finish.
    pub async fn stop(&self) {
        let Some(MonitorTask { shutdown, handle }) = self.task.lock().take() else {
            return;
        };

        // The receiver is gone if the loop already exited
        let _ = shutdown.send(());
        if let Err(e) = handle.await {
            log::error!("Health monitor loop ended abnormally: {e}");
        }
        log::info!("Health monitor stopped");
    }

    /// Run one cycle right now, independent of the background loop.
    /// Waits for a cycle that is already running to finish first.
    /// Returns whether the cycle succeeded.
    pub async fn check_now(&self) -> bool {
        self.inner.run_cycle().await
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        self.inner.state.lock().status
    }

    /// Whether the current status is [`MonitorStatus::Healthy`]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status() == MonitorStatus::Healthy
    }

    /// Whether the background loop is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// The newest `limit` probe results, oldest first
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<HealthCheckResult> {
        self.inner.history.lock().newest(limit)
    }

    /// Snapshot of monitor statistics
    #[must_use]
    pub fn stats(&self) -> MonitorStats {
        let state = *self.inner.state.lock();
        let (success_rate, average_latency, total_checks) = {
            let history = self.inner.history.lock();
            let (rate, latency) = history.recent_summary();
            (rate, latency, history.len())
        };
        let config = &self.inner.config;

        MonitorStats {
            status: state.status,
            is_healthy: state.status == MonitorStatus::Healthy,
            is_running: self.is_running(),
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
            failure_threshold: config.failure_threshold,
            recovery_threshold: config.recovery_threshold,
            interval: config.interval,
            domains: config.domains.clone(),
            recent_success_rate: format!("{success_rate:.1}%"),
            average_latency: format!("{average_latency:.1}ms"),
            total_checks,
            transitions: state.transitions,
        }
    }
}

impl MonitorInner {
    async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = &mut shutdown => break,
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    async fn run_cycle(&self) -> bool {
        let _cycle = self.cycle.lock().await;
        let results = join_all(self.config.domains.iter().map(|domain| self.probe(domain))).await;

        let each_check = self.subscribers.lock().each_check.clone();
        for result in &results {
            callbacks::notify_check(&each_check, result).await;
        }

        let successful = results.iter().filter(|result| result.success).count();
        let success = successful > results.len() / 2;
        log::debug!(
            "Health check: {successful}/{} reference domains resolved",
            results.len()
        );

        {
            let mut history = self.history.lock();
            for result in results {
                history.push(result);
            }
        }

        let thresholds = Thresholds {
            failure: self.config.failure_threshold,
            recovery: self.config.recovery_threshold,
        };
        let (previous, status) = {
            let mut state = self.state.lock();
            let Some(previous) = state.record(success, thresholds) else {
                return success;
            };
            (previous, state.status)
        };

        match status {
            MonitorStatus::Unhealthy => log::error!("Name resolution is unhealthy"),
            MonitorStatus::Degraded => log::warn!("Name resolution is degraded"),
            MonitorStatus::Healthy => log::info!("Name resolution recovered"),
        }
        log::info!("Health status changed: {previous} -> {status}");

        let (kind, subscribers) = self.subscribers.lock().for_transition(previous, status);
        callbacks::notify_state(kind, subscribers).await;
        success
    }

    async fn probe(&self, domain: &str) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, self.lookup.lookup(domain)).await;
        let latency = started.elapsed();

        let (success, latency, error) = match outcome {
            Ok(Ok(_)) => (true, latency, None),
            Ok(Err(e)) => (false, latency, Some(e.to_string())),
            Err(_) => (false, self.config.timeout, Some("Timeout".to_string())),
        };

        HealthCheckResult {
            domain: domain.to_string(),
            success,
            latency_ms: latency.as_secs_f64() * 1000.0,
            error,
            timestamp: SystemTime::now(),
        }
    }
}

/// Statistics of a [`HealthMonitor`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStats {
    /// Current status
    pub status: MonitorStatus,
    /// Whether the status is healthy
    pub is_healthy: bool,
    /// Whether the background loop is running
    pub is_running: bool,
    /// Failed cycles in a row
    pub consecutive_failures: u32,
    /// Successful cycles in a row
    pub consecutive_successes: u32,
    /// Configured failure threshold
    pub failure_threshold: u32,
    /// Configured recovery threshold
    pub recovery_threshold: u32,
    /// Configured interval between cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Probed reference domains
    pub domains: Vec<String>,
    /// Share of successful probes among the last ten
    pub recent_success_rate: String,
    /// Average latency of successful probes among the last ten
    pub average_latency: String,
    /// Probe results currently kept in the history
    pub total_checks: usize,
    /// Status changes since creation
    pub transitions: u64,
}
