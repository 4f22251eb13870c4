use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use super::history::HealthCheckResult;
use super::state::MonitorStatus;

/// Subscriber to a status transition
pub type StateCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Subscriber to every single probe result
pub type CheckCallback = Arc<dyn Fn(HealthCheckResult) -> BoxFuture<'static, ()> + Send + Sync>;

pub(crate) fn state_callback<F, Fut>(callback: F) -> StateCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || callback().boxed())
}

pub(crate) fn check_callback<F, Fut>(callback: F) -> CheckCallback
where
    F: Fn(HealthCheckResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |result| callback(result).boxed())
}

/// Registered subscribers, one list per event kind
#[derive(Default, Clone)]
pub(crate) struct Subscribers {
    pub(crate) unhealthy: Vec<StateCallback>,
    pub(crate) degraded: Vec<StateCallback>,
    pub(crate) recovered: Vec<StateCallback>,
    pub(crate) each_check: Vec<CheckCallback>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("unhealthy", &self.unhealthy.len())
            .field("degraded", &self.degraded.len())
            .field("recovered", &self.recovered.len())
            .field("each_check", &self.each_check.len())
            .finish()
    }
}

impl Subscribers {
    /// Subscribers to notify when entering `status` from `previous`
    pub(crate) fn for_transition(
        &self,
        previous: MonitorStatus,
        status: MonitorStatus,
    ) -> (&'static str, Vec<StateCallback>) {
        match status {
            MonitorStatus::Unhealthy => ("on_unhealthy", self.unhealthy.clone()),
            MonitorStatus::Degraded => ("on_degraded", self.degraded.clone()),
            MonitorStatus::Healthy if previous != MonitorStatus::Healthy => {
                ("on_recovered", self.recovered.clone())
            }
            MonitorStatus::Healthy => ("on_recovered", Vec::new()),
        }
    }
}

/// Run every subscriber in its own task, one after another.
///
/// A panicking subscriber is logged and does not affect the others.
pub(crate) async fn notify_state(kind: &str, callbacks: Vec<StateCallback>) {
    for callback in callbacks {
        let handle = tokio::spawn(async move { callback().await });
        if let Err(e) = handle.await {
            log::error!("Error in {kind} callback: {e}");
        }
    }
}

pub(crate) async fn notify_check(callbacks: &[CheckCallback], result: &HealthCheckResult) {
    for callback in callbacks {
        let callback = callback.clone();
        let result = result.clone();
        let handle = tokio::spawn(async move { callback(result).await });
        if let Err(e) = handle.await {
            log::error!("Error in on_each_check callback: {e}");
        }
    }
}
