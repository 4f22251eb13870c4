use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use http::StatusCode;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::config::CoordinatorConfig;
use super::slot::{ClientSlot, ClientSnapshot, ClientStatus, SlotGuard};
use crate::dns::{HickoryLookup, Lookup, Resolver, ResolverStats};
use crate::monitor::{HealthMonitor, MonitorStats, MonitorStatus};
use crate::ratelimit::{RateLimiter, RateLimiterStats};
use crate::{ErrorKind, Result};

/// State of the gate every slot acquisition passes first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Paused,
    Closed,
}

/// Builder for a [`Coordinator`].
///
/// All fields are optional. Without custom lookups the resolver queries the
/// configured providers and the monitor probes through the system resolver.
#[derive(TypedBuilder, Debug)]
#[builder(field_defaults(default))]
#[builder(builder_method(doc = "
Create a builder for building a `Coordinator`.
On the builder call, call methods with same name as its fields to set their values.
Finally, call `.build()` to create the instance of `CoordinatorBuilder`.
"))]
pub struct CoordinatorBuilder {
    /// Limits, defaults and the configuration of every component
    config: CoordinatorConfig,

    /// Transports used by the resolver, one per named provider.
    /// Overrides `config.resolver.providers`.
    #[builder(setter(strip_option))]
    providers: Option<Vec<(String, Arc<dyn Lookup>)>>,

    /// Transport used by the health monitor probes
    #[builder(setter(strip_option))]
    probe: Option<Arc<dyn Lookup>>,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CoordinatorBuilder {
    /// Instantiate the [`Coordinator`] and its components
    #[must_use]
    pub fn coordinator(self) -> Coordinator {
        let Self {
            mut config,
            providers,
            probe,
        } = self;
        config.max_global_connections =
            clamp_budget("Global connections", config.max_global_connections);

        let resolver = match providers {
            Some(lookups) => Resolver::from_lookups(&config.resolver, lookups),
            None => Resolver::new(&config.resolver),
        };
        let probe = probe
            .unwrap_or_else(|| Arc::new(HickoryLookup::system(config.monitor.timeout)));
        let monitor = HealthMonitor::with_lookup(config.monitor.clone(), probe);
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());

        let (gate, _) = watch::channel(Gate::Open);
        let inner = Arc::new(CoordinatorInner {
            global: Semaphore::new(config.max_global_connections),
            clients: DashMap::new(),
            gate,
            resolver,
            monitor,
            rate_limiter,
            started_at: Mutex::new(None),
            global_current: AtomicUsize::new(0),
            total_acquired: AtomicU64::new(0),
            total_released: AtomicU64::new(0),
            config,
        });

        if inner.config.auto_pause {
            let weak = Arc::downgrade(&inner);
            inner.monitor.on_unhealthy(move || {
                on_coordinator(weak.clone(), |inner| {
                    log::error!("Name resolution is unhealthy, pausing all clients");
                    inner.pause_all();
                })
            });
            let weak = Arc::downgrade(&inner);
            inner.monitor.on_recovered(move || {
                on_coordinator(weak.clone(), |inner| {
                    log::info!("Name resolution recovered, resuming all clients");
                    inner.resume_all();
                })
            });
        }

        Coordinator { inner }
    }
}

/// Keep a budget within what a semaphore can enforce: zero would never hand
/// out a slot and anything above [`Semaphore::MAX_PERMITS`] cannot be
/// represented.
fn clamp_budget(what: &str, budget: usize) -> usize {
    let clamped = budget.clamp(1, Semaphore::MAX_PERMITS);
    if clamped != budget {
        log::warn!("{what} budget of {budget} is out of range, using {clamped} instead");
    }
    clamped
}

/// Run `action` if the coordinator is still alive
async fn on_coordinator(
    coordinator: Weak<CoordinatorInner>,
    action: impl FnOnce(&CoordinatorInner) + Send,
) {
    if let Some(inner) = coordinator.upgrade() {
        action(&inner);
    }
}

/// Shares name resolution, health monitoring and pacing between clients
/// and bounds how many requests they run concurrently.
///
/// Every client registers under a name with its own budget. A slot must be
/// held for every outgoing request; acquiring one waits until the pause
/// gate is open, the client is below its budget and the global budget has
/// room. With `auto_pause` the health monitor closes the pause gate while
/// name resolution is unhealthy.
///
/// `Coordinator` is a cheap handle. Clones share the same state.
///
/// ```no_run
/// # use netgate_lib::{Coordinator, Result};
/// # async fn run() -> Result<()> {
/// let coordinator = Coordinator::default();
/// coordinator.register_client("crawler", Some(2));
/// coordinator.start_monitoring();
///
/// let _slot = coordinator.slot("crawler").await?;
/// let address = coordinator.resolve("example.com").await?;
/// coordinator.rate_limit("example.com").await;
/// // ... send the request to `address` ...
///
/// coordinator.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    config: CoordinatorConfig,
    global: Semaphore,
    clients: DashMap<String, ClientSlot>,
    gate: watch::Sender<Gate>,
    resolver: Resolver,
    monitor: HealthMonitor,
    rate_limiter: RateLimiter,
    started_at: Mutex<Option<Instant>>,
    global_current: AtomicUsize,
    total_acquired: AtomicU64,
    total_released: AtomicU64,
}

impl Default for Coordinator {
    fn default() -> Self {
        CoordinatorBuilder::default().coordinator()
    }
}

impl Coordinator {
    /// Create a coordinator from `config` with the default transports
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        CoordinatorBuilder::builder()
            .config(config)
            .build()
            .coordinator()
    }

    /// Register a client, or update the budget of a registered one.
    ///
    /// Without `max_concurrent` the budget comes from
    /// `client_defaults`, falling back to two slots. A budget of zero is
    /// raised to one and one above [`Semaphore::MAX_PERMITS`] is lowered
    /// to it.
    ///
    /// Shrinking the budget of a busy client retires idle slots right away
    /// and the remaining ones as the holders release them.
    pub fn register_client(&self, name: &str, max_concurrent: Option<usize>) -> ClientSnapshot {
        let budget = clamp_budget(
            &format!("Client {name}"),
            max_concurrent.unwrap_or_else(|| self.inner.config.client_budget(name)),
        );

        match self.inner.clients.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if slot.max_concurrent != budget {
                    log::info!(
                        "Client {name} already registered, budget changed from {} to {budget}",
                        slot.max_concurrent
                    );
                    slot.resize(budget);
                }
                slot.snapshot(name)
            }
            Entry::Vacant(entry) => {
                log::info!("Registered client {name} with up to {budget} concurrent slots");
                entry.insert(ClientSlot::new(budget)).snapshot(name)
            }
        }
    }

    /// Wait for a slot of client `name`.
    ///
    /// Every successful call must be paired with [`Coordinator::release_slot`].
    /// Prefer [`Coordinator::slot`], which does that automatically.
    /// Waits indefinitely while paused; wrap the call in
    /// [`tokio::time::timeout`] to bound it. Dropping the future before it
    /// completes leaves no slot behind.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::UnknownClient`] if `name` was never registered
    /// - [`ErrorKind::Closed`] if the coordinator is closed
    pub async fn acquire_slot(&self, name: &str) -> Result<()> {
        let gate = self
            .inner
            .clients
            .get(name)
            .map(|client| Arc::clone(&client.gate))
            .ok_or_else(|| ErrorKind::UnknownClient(name.to_string()))?;

        let mut pause = self.inner.gate.subscribe();
        if *pause.borrow() == Gate::Paused {
            log::debug!("Client {name} waiting for work to be resumed");
        }
        // The sender lives in `inner`, so this only returns once the gate
        // is no longer paused
        let _ = pause.wait_for(|gate| *gate != Gate::Paused).await;

        let client_permit = gate.acquire().await.map_err(|_| ErrorKind::Closed)?;
        let global_permit = self
            .inner
            .global
            .acquire()
            .await
            .map_err(|_| ErrorKind::Closed)?;

        {
            let Some(mut client) = self.inner.clients.get_mut(name) else {
                return Err(ErrorKind::UnknownClient(name.to_string()));
            };
            client_permit.forget();
            global_permit.forget();
            client.current += 1;
            client.total_requests += 1;
            client.status = ClientStatus::Running;
            log::debug!(
                "Client {name} acquired a slot ({}/{})",
                client.current,
                client.max_concurrent
            );
        }

        self.inner.global_current.fetch_add(1, Ordering::SeqCst);
        self.inner.total_acquired.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Give back a slot of client `name`.
    ///
    /// Releasing is never blocked by the pause gate. Does nothing if the
    /// client holds no slot.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::UnknownClient`] if `name` was never registered.
    pub fn release_slot(&self, name: &str) -> Result<()> {
        {
            let mut client = self
                .inner
                .clients
                .get_mut(name)
                .ok_or_else(|| ErrorKind::UnknownClient(name.to_string()))?;
            if !client.release() {
                log::debug!("Client {name} released a slot it did not hold");
                return Ok(());
            }
            log::debug!(
                "Client {name} released a slot ({}/{})",
                client.current,
                client.max_concurrent
            );
        }

        self.inner.global.add_permits(1);
        self.inner.global_current.fetch_sub(1, Ordering::SeqCst);
        self.inner.total_released.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Wait for a slot of client `name` that is released when the returned
    /// guard is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::acquire_slot`].
    pub async fn slot(&self, name: &str) -> Result<SlotGuard> {
        self.acquire_slot(name).await?;
        Ok(SlotGuard::new(self.clone(), name.to_string()))
    }

    /// Resolve `hostname` through the shared cache and providers
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub async fn resolve(&self, hostname: &str) -> Result<IpAddr> {
        self.inner.resolver.resolve(hostname, true).await
    }

    /// Wait until a request to `destination` is allowed.
    /// Returns how long the call waited.
    pub async fn rate_limit(&self, destination: &str) -> Duration {
        self.inner.rate_limiter.acquire(destination).await
    }

    /// Record a failed request of client `name` to `destination`.
    ///
    /// The error counts against the client. `429 Too Many Requests`
    /// additionally slows down further requests to the destination.
    pub fn report_error(&self, name: &str, destination: &str, status: StatusCode) {
        match self.inner.clients.get_mut(name) {
            Some(mut client) => client.total_errors += 1,
            None => log::debug!("Error reported for unregistered client {name}"),
        }
        self.inner.rate_limiter.report_status(destination, status);
    }

    /// Record a successful request to `destination`, relaxing an escalated
    /// delay
    pub fn report_success(&self, destination: &str) {
        self.inner.rate_limiter.report_success(destination);
    }

    /// Stop handing out new slots. Held slots are unaffected.
    pub fn pause_all(&self) {
        self.inner.pause_all();
    }

    /// Hand out slots again
    pub fn resume_all(&self) {
        self.inner.resume_all();
    }

    /// Whether new slots are currently withheld
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.inner.gate.borrow() == Gate::Paused
    }

    /// Start the background health monitor.
    /// Does nothing if it is already running.
    pub fn start_monitoring(&self) {
        if !self.inner.monitor.is_running() {
            *self.inner.started_at.lock() = Some(Instant::now());
        }
        self.inner.monitor.start();
    }

    /// Stop the background health monitor and wait for it to exit
    pub async fn stop_monitoring(&self) {
        self.inner.monitor.stop().await;
    }

    /// Shut the coordinator down.
    ///
    /// Waiting and future slot acquisitions fail with [`ErrorKind::Closed`],
    /// the monitor is stopped and the fallback HTTP client is dropped.
    /// Releasing slots keeps working. Calling this again does nothing.
    pub async fn close(&self) {
        let closing = self.inner.gate.send_if_modified(|gate| {
            if *gate == Gate::Closed {
                return false;
            }
            *gate = Gate::Closed;
            true
        });
        if !closing {
            return;
        }

        self.inner.global.close();
        for client in &self.inner.clients {
            client.gate.close();
        }
        self.stop_monitoring().await;
        self.inner.resolver.close();
        log::info!("Coordinator closed");
    }

    /// Current status of name resolution according to the monitor
    #[must_use]
    pub fn dns_status(&self) -> MonitorStatus {
        self.inner.monitor.status()
    }

    /// Snapshot of a registered client
    #[must_use]
    pub fn client_status(&self, name: &str) -> Option<ClientSnapshot> {
        self.inner
            .clients
            .get(name)
            .map(|client| client.snapshot(name))
    }

    /// The shared resolver
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    /// The shared rate limiter
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    /// The health monitor, e.g. to subscribe to status changes
    #[must_use]
    pub fn monitor(&self) -> &HealthMonitor {
        &self.inner.monitor
    }

    /// Snapshot of the coordinator and all of its components
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        let uptime = self
            .inner
            .started_at
            .lock()
            .map_or(Duration::ZERO, |started| started.elapsed());

        CoordinatorStats {
            uptime_seconds: uptime.as_secs_f64(),
            is_paused: self.is_paused(),
            global: GlobalConnections {
                current: self.inner.global_current.load(Ordering::SeqCst),
                max: self.inner.config.max_global_connections,
            },
            total_slots_acquired: self.inner.total_acquired.load(Ordering::Relaxed),
            total_slots_released: self.inner.total_released.load(Ordering::Relaxed),
            clients: self
                .inner
                .clients
                .iter()
                .map(|client| (client.key().clone(), client.snapshot(client.key())))
                .collect(),
            resolver: self.inner.resolver.stats(),
            monitor: self.inner.monitor.stats(),
            rate_limiter: self.inner.rate_limiter.stats(),
        }
    }
}

impl CoordinatorInner {
    fn pause_all(&self) {
        let paused = self.gate.send_if_modified(|gate| {
            if *gate != Gate::Open {
                return false;
            }
            *gate = Gate::Paused;
            true
        });
        if *self.gate.borrow() != Gate::Paused {
            return;
        }

        for mut client in self.clients.iter_mut() {
            if client.status == ClientStatus::Running {
                client.status = ClientStatus::Paused;
            }
        }
        if paused {
            log::warn!("Paused all clients");
        }
    }

    fn resume_all(&self) {
        let resumed = self.gate.send_if_modified(|gate| {
            if *gate != Gate::Paused {
                return false;
            }
            *gate = Gate::Open;
            true
        });
        if !resumed {
            return;
        }

        for mut client in self.clients.iter_mut() {
            if client.status == ClientStatus::Paused {
                client.status = ClientStatus::Idle;
            }
        }
        log::info!("Resumed all clients");
    }
}

/// Number of slots in use across all clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlobalConnections {
    /// Slots currently held
    pub current: usize,
    /// Global budget
    pub max: usize,
}

/// Statistics of a [`Coordinator`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorStats {
    /// Seconds since monitoring was started, zero before
    pub uptime_seconds: f64,
    /// Whether new slots are withheld
    pub is_paused: bool,
    /// Global slot usage
    pub global: GlobalConnections,
    /// Slots handed out since creation
    pub total_slots_acquired: u64,
    /// Slots given back since creation
    pub total_slots_released: u64,
    /// Registered clients by name
    pub clients: BTreeMap<String, ClientSnapshot>,
    /// Resolver statistics
    pub resolver: ResolverStats,
    /// Health monitor statistics
    pub monitor: MonitorStats,
    /// Rate limiter statistics
    pub rate_limiter: RateLimiterStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::ResolverConfig;
    use crate::monitor::MonitorConfig;
    use crate::test_utils::{Outcome, ScriptedLookup};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    fn config(max_global_connections: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            max_global_connections,
            resolver: ResolverConfig {
                fallback_endpoints: vec![],
                ..ResolverConfig::default()
            },
            monitor: MonitorConfig {
                domains: vec!["a.example".into()],
                failure_threshold: 1,
                recovery_threshold: 2,
                ..MonitorConfig::default()
            },
            ..CoordinatorConfig::default()
        }
    }

    fn coordinator(config: CoordinatorConfig) -> (Coordinator, Arc<ScriptedLookup>) {
        let probe = Arc::new(ScriptedLookup::always("127.0.0.1"));
        let provider: Arc<dyn Lookup> = Arc::new(ScriptedLookup::always("10.0.0.1"));
        let coordinator = CoordinatorBuilder::builder()
            .config(config)
            .providers(vec![("10.0.0.53".to_string(), provider)])
            .probe(probe.clone())
            .build()
            .coordinator();
        (coordinator, probe)
    }

    #[tokio::test]
    async fn test_register_uses_defaults() {
        let mut config = config(6);
        config.client_defaults.insert("crawler".into(), 4);
        let (coordinator, _) = coordinator(config);

        assert_eq!(coordinator.register_client("crawler", None).max_concurrent, 4);
        assert_eq!(coordinator.register_client("other", None).max_concurrent, 2);
        assert_eq!(coordinator.register_client("explicit", Some(5)).max_concurrent, 5);
        assert_eq!(coordinator.register_client("zero", Some(0)).max_concurrent, 1);

        let snapshot = coordinator.client_status("crawler").unwrap();
        assert_eq!(snapshot.status, ClientStatus::Idle);
        assert_eq!(snapshot.current, 0);
        assert!(coordinator.client_status("nobody").is_none());
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let (coordinator, _) = coordinator(config(6));
        assert_eq!(
            coordinator.acquire_slot("nobody").await,
            Err(ErrorKind::UnknownClient("nobody".into()))
        );
        assert_eq!(
            coordinator.release_slot("nobody"),
            Err(ErrorKind::UnknownClient("nobody".into()))
        );
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(2));

        coordinator.acquire_slot("a").await.unwrap();
        let snapshot = coordinator.client_status("a").unwrap();
        assert_eq!(snapshot.current, 1);
        assert_eq!(snapshot.status, ClientStatus::Running);
        assert_eq!(coordinator.stats().global.current, 1);

        coordinator.release_slot("a").unwrap();
        let snapshot = coordinator.client_status("a").unwrap();
        assert_eq!(snapshot.current, 0);
        assert_eq!(snapshot.status, ClientStatus::Idle);

        // Extra releases are ignored
        coordinator.release_slot("a").unwrap();
        let stats = coordinator.stats();
        assert_eq!(stats.global.current, 0);
        assert_eq!(stats.total_slots_acquired, 1);
        assert_eq!(stats.total_slots_released, 1);
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(1));

        let slot = coordinator.slot("a").await.unwrap();
        assert_eq!(slot.client(), "a");
        assert!(
            timeout(Duration::from_millis(50), coordinator.acquire_slot("a"))
                .await
                .is_err()
        );

        drop(slot);
        assert_eq!(coordinator.client_status("a").unwrap().current, 0);
        let _slot = coordinator.slot("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_guard_releases_on_error_path() {
        async fn work(coordinator: &Coordinator) -> Result<()> {
            let _slot = coordinator.slot("a").await?;
            Err(ErrorKind::Configuration("boom".into()))
        }

        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(1));
        assert!(work(&coordinator).await.is_err());
        assert_eq!(coordinator.client_status("a").unwrap().current, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budgets_hold_under_load() {
        let (coordinator, _) = coordinator(config(3));
        coordinator.register_client("a", Some(2));
        coordinator.register_client("b", Some(2));

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for i in 0..20 {
            let coordinator = coordinator.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let name = if i % 2 == 0 { "a" } else { "b" };
            tasks.push(tokio::spawn(async move {
                let _slot = coordinator.slot(name).await.unwrap();
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                assert!(coordinator.client_status(name).unwrap().current <= 2);
                assert!(coordinator.stats().global.current <= 3);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let stats = coordinator.stats();
        assert_eq!(stats.global.current, 0);
        assert_eq!(stats.total_slots_acquired, 20);
        assert_eq!(stats.total_slots_released, 20);
        assert_eq!(stats.clients["a"].total_requests, 10);
        assert_eq!(stats.clients["b"].total_requests, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_budgets_hold_across_threads() {
        const TASKS: usize = 200;

        let (coordinator, _) = coordinator(config(4));
        coordinator.register_client("a", Some(3));
        coordinator.register_client("b", Some(2));

        let global = Arc::new(AtomicUsize::new(0));
        let global_peak = Arc::new(AtomicUsize::new(0));
        let per_client: Arc<[(AtomicUsize, AtomicUsize); 2]> = Arc::new([
            (AtomicUsize::new(0), AtomicUsize::new(0)),
            (AtomicUsize::new(0), AtomicUsize::new(0)),
        ]);

        let mut tasks = Vec::new();
        for i in 0..TASKS {
            let task_coordinator = coordinator.clone();
            let global = Arc::clone(&global);
            let global_peak = Arc::clone(&global_peak);
            let per_client = Arc::clone(&per_client);
            let (name, index) = if i % 2 == 0 { ("a", 0) } else { ("b", 1) };
            tasks.push(tokio::spawn(async move {
                let slot = task_coordinator.slot(name).await.unwrap();
                let (in_flight, peak) = &per_client[index];
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let now = global.fetch_add(1, Ordering::SeqCst) + 1;
                global_peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                global.fetch_sub(1, Ordering::SeqCst);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(slot);
            }));
            if i == TASKS / 2 {
                // Shrink while slots of "a" are held and waiters queue up
                coordinator.register_client("a", Some(1));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(global_peak.load(Ordering::SeqCst) <= 4);
        assert!(per_client[0].1.load(Ordering::SeqCst) <= 3);
        assert!(per_client[1].1.load(Ordering::SeqCst) <= 2);

        let stats = coordinator.stats();
        assert_eq!(stats.global.current, 0);
        assert_eq!(stats.total_slots_acquired, TASKS as u64);
        assert_eq!(stats.total_slots_released, TASKS as u64);

        // All shrink debt is paid off: exactly one slot of "a" is left
        let _held = coordinator.slot("a").await.unwrap();
        assert!(
            timeout(Duration::from_millis(50), coordinator.acquire_slot("a"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_zero_global_budget_still_hands_out_slots() {
        let (coordinator, _) = coordinator(config(0));
        coordinator.register_client("a", Some(2));

        let slot = timeout(Duration::from_secs(1), coordinator.slot("a"))
            .await
            .expect("a global budget of zero must not block forever")
            .unwrap();
        assert_eq!(coordinator.stats().global.max, 1);
        assert!(
            timeout(Duration::from_millis(50), coordinator.acquire_slot("a"))
                .await
                .is_err()
        );
        drop(slot);
    }

    #[tokio::test]
    async fn test_oversized_budgets_are_capped() {
        let (coordinator, _) = coordinator(config(usize::MAX));
        assert_eq!(coordinator.stats().global.max, Semaphore::MAX_PERMITS);

        let snapshot = coordinator.register_client("a", Some(usize::MAX));
        assert_eq!(snapshot.max_concurrent, Semaphore::MAX_PERMITS);
        let snapshot = coordinator.register_client("a", Some(Semaphore::MAX_PERMITS + 1));
        assert_eq!(snapshot.max_concurrent, Semaphore::MAX_PERMITS);

        coordinator.acquire_slot("a").await.unwrap();
        coordinator.release_slot("a").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_acquire_not_release() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(2));
        coordinator.acquire_slot("a").await.unwrap();

        coordinator.pause_all();
        assert!(coordinator.is_paused());
        assert_eq!(
            coordinator.client_status("a").unwrap().status,
            ClientStatus::Paused
        );

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.acquire_slot("a").await }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!pending.is_finished());

        coordinator.release_slot("a").unwrap();
        assert_eq!(coordinator.client_status("a").unwrap().current, 0);

        coordinator.resume_all();
        assert!(!coordinator.is_paused());
        pending.await.unwrap().unwrap();
        assert_eq!(coordinator.client_status("a").unwrap().current, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinking_budget_waits_for_holders() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(3));
        coordinator.acquire_slot("a").await.unwrap();
        coordinator.acquire_slot("a").await.unwrap();

        let snapshot = coordinator.register_client("a", Some(1));
        assert_eq!(snapshot.max_concurrent, 1);
        assert_eq!(snapshot.current, 2);

        coordinator.release_slot("a").unwrap();
        assert!(
            timeout(Duration::from_secs(1), coordinator.acquire_slot("a"))
                .await
                .is_err()
        );

        coordinator.release_slot("a").unwrap();
        coordinator.acquire_slot("a").await.unwrap();
        assert!(
            timeout(Duration::from_secs(1), coordinator.acquire_slot("a"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_growing_budget() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(1));
        coordinator.acquire_slot("a").await.unwrap();

        coordinator.register_client("a", Some(2));
        timeout(Duration::from_secs(1), coordinator.acquire_slot("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(coordinator.client_status("a").unwrap().current, 2);
    }

    #[tokio::test]
    async fn test_auto_pause_follows_monitor() {
        let (coordinator, probe) = coordinator(config(6));

        probe.set_outcome(Outcome::Fail);
        coordinator.monitor().check_now().await;
        assert_eq!(coordinator.dns_status(), MonitorStatus::Unhealthy);
        assert!(coordinator.is_paused());

        probe.set_outcome(Outcome::Succeed);
        coordinator.monitor().check_now().await;
        assert!(coordinator.is_paused());
        coordinator.monitor().check_now().await;
        assert_eq!(coordinator.dns_status(), MonitorStatus::Healthy);
        assert!(!coordinator.is_paused());
    }

    #[tokio::test]
    async fn test_auto_pause_disabled() {
        let (coordinator, probe) = coordinator(CoordinatorConfig {
            auto_pause: false,
            ..config(6)
        });

        probe.set_outcome(Outcome::Fail);
        coordinator.monitor().check_now().await;
        assert_eq!(coordinator.dns_status(), MonitorStatus::Unhealthy);
        assert!(!coordinator.is_paused());
    }

    #[tokio::test]
    async fn test_resolve_through_providers() {
        let (coordinator, _) = coordinator(config(6));
        let address = coordinator.resolve("example.com").await.unwrap();
        assert_eq!(address, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(coordinator.stats().resolver.cache.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_and_feedback() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(2));
        for _ in 0..4 {
            let _slot = coordinator.slot("a").await.unwrap();
        }

        assert_eq!(coordinator.rate_limit("api.example.com").await, Duration::ZERO);
        assert_eq!(
            coordinator.rate_limit("https://api.example.com/v1").await,
            Duration::from_secs(1)
        );

        let limiter = coordinator.rate_limiter();
        coordinator.report_error("a", "api.example.com", StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(limiter.current_delay("api.example.com"), Duration::from_secs(1));

        coordinator.report_error("a", "api.example.com", StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            limiter.current_delay("api.example.com"),
            Duration::from_millis(1500)
        );

        coordinator.report_success("api.example.com");
        assert!(limiter.current_delay("api.example.com") < Duration::from_millis(1500));

        let snapshot = coordinator.client_status("a").unwrap();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.total_errors, 2);
        assert_eq!(snapshot.error_rate, "50.0%");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(1));
        coordinator.acquire_slot("a").await.unwrap();

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.acquire_slot("a").await }
        });
        tokio::task::yield_now().await;

        coordinator.close().await;
        coordinator.close().await;

        assert_eq!(pending.await.unwrap(), Err(ErrorKind::Closed));
        assert_eq!(coordinator.acquire_slot("a").await, Err(ErrorKind::Closed));
        coordinator.release_slot("a").unwrap();
        assert_eq!(coordinator.stats().global.current, 0);
        assert!(!coordinator.monitor().is_running());
    }

    #[tokio::test]
    async fn test_close_releases_paused_waiters() {
        let (coordinator, _) = coordinator(config(6));
        coordinator.register_client("a", Some(1));
        coordinator.pause_all();

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.acquire_slot("a").await }
        });
        tokio::task::yield_now().await;

        coordinator.close().await;
        assert_eq!(pending.await.unwrap(), Err(ErrorKind::Closed));
        assert!(!coordinator.is_paused());

        // Pausing a closed coordinator has no effect
        coordinator.pause_all();
        assert!(!coordinator.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_starts_with_monitoring() {
        let (coordinator, _) = coordinator(config(6));
        assert!(coordinator.stats().uptime_seconds.abs() < f64::EPSILON);

        coordinator.start_monitoring();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let stats = coordinator.stats();
        assert!(stats.uptime_seconds >= 5.0);
        assert!(stats.monitor.is_running);

        coordinator.stop_monitoring().await;
        assert!(!coordinator.monitor().is_running());
    }

    #[tokio::test]
    async fn test_stats_serialize() {
        let (coordinator, _) = coordinator(config(3));
        coordinator.register_client("a", Some(2));

        let stats = serde_json::to_value(coordinator.stats()).unwrap();
        assert_eq!(stats["global"]["max"], 3);
        assert_eq!(stats["clients"]["a"]["status"], "idle");
        assert_eq!(stats["is_paused"], false);
    }
}
