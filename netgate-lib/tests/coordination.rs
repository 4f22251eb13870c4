mod common;

#[cfg(test)]
mod coordination {
    use crate::common::FixedLookup;
    use netgate_lib::{
        ClientStatus, Coordinator, CoordinatorBuilder, CoordinatorConfig, Lookup, MonitorConfig,
        MonitorStatus, ResolverConfig,
    };
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn coordinator(probe: Arc<FixedLookup>) -> Coordinator {
        let config = CoordinatorConfig {
            max_global_connections: 3,
            resolver: ResolverConfig {
                fallback_endpoints: vec![],
                ..ResolverConfig::default()
            },
            monitor: MonitorConfig {
                interval: Duration::from_secs(10),
                domains: vec!["a.example".into(), "b.example".into(), "c.example".into()],
                failure_threshold: 2,
                recovery_threshold: 2,
                ..MonitorConfig::default()
            },
            ..CoordinatorConfig::default()
        };
        let provider: Arc<dyn Lookup> = FixedLookup::new("192.0.2.1");
        CoordinatorBuilder::builder()
            .config(config)
            .providers(vec![("192.0.2.53".to_string(), provider)])
            .probe(probe)
            .build()
            .coordinator()
    }

    fn spawn_acquire(coordinator: &Coordinator, name: &'static str) -> JoinHandle<()> {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.acquire_slot(name).await.unwrap() })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    fn current(coordinator: &Coordinator, name: &str) -> usize {
        coordinator.client_status(name).unwrap().current
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_and_global_budgets() {
        let coordinator = coordinator(FixedLookup::new("127.0.0.1"));
        coordinator.register_client("a", Some(2));
        coordinator.register_client("b", Some(2));

        let a: Vec<_> = (0..4).map(|_| spawn_acquire(&coordinator, "a")).collect();
        settle().await;
        assert_eq!(current(&coordinator, "a"), 2);
        assert_eq!(a.iter().filter(|task| task.is_finished()).count(), 2);

        let b: Vec<_> = (0..2).map(|_| spawn_acquire(&coordinator, "b")).collect();
        settle().await;
        assert_eq!(current(&coordinator, "b"), 1);
        assert_eq!(b.iter().filter(|task| task.is_finished()).count(), 1);
        assert_eq!(coordinator.stats().global.current, 3);

        // Releasing one of "a" lets exactly one more slot through, globally
        coordinator.release_slot("a").unwrap();
        settle().await;
        assert_eq!(coordinator.stats().global.current, 3);

        for name in ["b", "a"] {
            coordinator.release_slot(name).unwrap();
            settle().await;
        }
        for task in a.into_iter().chain(b) {
            task.await.unwrap();
        }
        let stats = coordinator.stats();
        assert_eq!(stats.total_slots_acquired, 6);
        assert_eq!(stats.total_slots_released, 3);
        assert_eq!(stats.global.current, 3);
        coordinator.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_pauses_and_resumes_work() {
        let probe = FixedLookup::new("127.0.0.1");
        let coordinator = coordinator(probe.clone());
        coordinator.register_client("a", Some(2));
        coordinator.start_monitoring();
        settle().await;
        assert_eq!(coordinator.dns_status(), MonitorStatus::Healthy);

        let held = coordinator.slot("a").await.unwrap();

        probe.set_reachable(false);
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(coordinator.dns_status(), MonitorStatus::Unhealthy);
        assert!(coordinator.is_paused());
        assert_eq!(
            coordinator.client_status("a").unwrap().status,
            ClientStatus::Paused
        );

        let waiting = spawn_acquire(&coordinator, "a");
        settle().await;
        assert!(!waiting.is_finished());

        // Held slots can still be given back while paused
        drop(held);
        assert_eq!(current(&coordinator, "a"), 0);

        probe.set_reachable(true);
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(coordinator.dns_status(), MonitorStatus::Healthy);
        assert!(!coordinator.is_paused());
        waiting.await.unwrap();
        assert_eq!(current(&coordinator, "a"), 1);

        coordinator.close().await;
        assert!(!coordinator.monitor().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_request() {
        let coordinator = coordinator(FixedLookup::new("127.0.0.1"));
        coordinator.register_client("crawler", None);

        for _ in 0..3 {
            let _slot = coordinator.slot("crawler").await.unwrap();
            let address = coordinator.resolve("example.com").await.unwrap();
            assert_eq!(address, "192.0.2.1".parse::<IpAddr>().unwrap());
            coordinator.rate_limit("example.com").await;
            coordinator.report_success("example.com");
        }

        let stats = coordinator.stats();
        assert_eq!(stats.clients["crawler"].total_requests, 3);
        assert_eq!(stats.clients["crawler"].max_concurrent, 2);
        assert_eq!(stats.resolver.cache.hits, 2);
        assert_eq!(stats.rate_limiter.total_requests, 3);
        assert_eq!(stats.rate_limiter.total_blocked, 2);
        assert_eq!(stats.global.current, 0);
    }
}
