use futures::future::join_all;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use super::cache::{CacheStats, ResolutionCache};
use super::config::ResolverConfig;
use super::fallback::Fallback;
use super::lookup::{HickoryLookup, Lookup};
use super::provider::{
    HealthPolicy, Provider, ProviderHealth, ProviderStats, Rotation, RotationStrategy,
};
use crate::types::LookupError;
use crate::{ErrorKind, Result};

/// Caching multi-provider resolver.
///
/// A lookup tries the cache first, then up to one direct attempt per
/// configured provider (in the order picked by the [`RotationStrategy`]),
/// then each fallback endpoint in order. Successful answers are written
/// back to the cache. Failures of single providers only affect their health
/// and are never returned unless every path has been exhausted.
#[derive(Debug)]
pub struct Resolver {
    cache: ResolutionCache,
    providers: Vec<Provider>,
    rotation: Rotation,
    policy: HealthPolicy,
    timeout: Duration,
    fallback: Fallback,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

impl Resolver {
    /// Create a resolver querying the configured providers via
    /// [`HickoryLookup`]
    #[must_use]
    pub fn new(config: &ResolverConfig) -> Self {
        let lookups = config
            .providers
            .iter()
            .map(|provider| {
                let lookup: Arc<dyn Lookup> =
                    Arc::new(HickoryLookup::provider(provider, config.timeout));
                (provider.clone(), lookup)
            })
            .collect();
        Self::from_lookups(config, lookups)
    }

    /// Create a resolver with custom transports, one per named provider.
    /// `config.providers` is ignored in favour of `lookups`.
    #[must_use]
    pub fn from_lookups(config: &ResolverConfig, lookups: Vec<(String, Arc<dyn Lookup>)>) -> Self {
        Self {
            cache: ResolutionCache::new(config.cache_ttl, config.cache_size),
            providers: lookups
                .into_iter()
                .map(|(address, lookup)| Provider::new(address, lookup))
                .collect(),
            rotation: Rotation::new(config.strategy),
            policy: HealthPolicy {
                failure_threshold: config.failure_threshold,
                recovery_window: config.recovery_window,
            },
            timeout: config.timeout,
            fallback: Fallback::new(config.fallback_endpoints.clone(), config.fallback_timeout),
        }
    }

    /// Resolve `hostname` to an address.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Resolution`] if every provider and fallback endpoint failed
    /// - [`ErrorKind::Configuration`] if a fallback endpoint is not a valid URL
    pub async fn resolve(&self, hostname: &str, use_cache: bool) -> Result<IpAddr> {
        if use_cache && let Some(address) = self.cache.get(hostname) {
            log::debug!("Cache hit for {hostname}: {address}");
            return Ok(address);
        }

        let mut last_error = None;
        let mut providers_tried = 0;

        for _ in 0..self.providers.len() {
            let Some(index) = self.rotation.select(&self.providers, self.policy) else {
                continue;
            };
            let provider = &self.providers[index];
            providers_tried += 1;

            match self.query(provider, hostname).await {
                Ok(address) => {
                    self.cache.set(hostname, address, None);
                    provider.record_success();
                    log::debug!("Resolved {hostname} -> {address} via {}", provider.address);
                    return Ok(address);
                }
                Err(e) => {
                    provider.record_failure();
                    log::warn!(
                        "Resolution of {hostname} via {} failed: {e}",
                        provider.address
                    );
                    last_error = Some(e);
                }
            }
        }

        if self.fallback.is_configured() {
            match self.fallback.resolve(hostname).await {
                Ok(address) => {
                    self.cache.set(hostname, address, None);
                    log::info!("Resolved {hostname} -> {address} via fallback");
                    return Ok(address);
                }
                Err(e) if e.is_configuration() => {
                    return Err(ErrorKind::Configuration(e.to_string()));
                }
                Err(e) => {
                    log::error!("Fallback resolution of {hostname} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(ErrorKind::Resolution {
            hostname: hostname.to_string(),
            providers_tried,
            last_error,
        })
    }

    async fn query(
        &self,
        provider: &Provider,
        hostname: &str,
    ) -> std::result::Result<IpAddr, LookupError> {
        tokio::time::timeout(self.timeout, provider.lookup.lookup(hostname))
            .await
            .unwrap_or_else(|_| {
                Err(LookupError::Timeout {
                    hostname: hostname.to_string(),
                    via: provider.address.clone(),
                })
            })
    }

    /// Resolve all `hostnames` concurrently to warm the cache.
    ///
    /// Individual failures are logged and otherwise ignored. Returns the
    /// number of hostnames that resolved.
    pub async fn prefetch<I, S>(&self, hostnames: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hostnames: Vec<S> = hostnames.into_iter().collect();
        let results = join_all(
            hostnames
                .iter()
                .map(|hostname| self.resolve(hostname.as_ref(), true)),
        )
        .await;

        let mut resolved = 0;
        for (hostname, result) in hostnames.iter().zip(results) {
            match result {
                Ok(_) => resolved += 1,
                Err(e) => log::debug!("Prefetching {} failed: {e}", hostname.as_ref()),
            }
        }
        resolved
    }

    /// The cache backing this resolver
    #[must_use]
    pub const fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Health record of the provider configured as `address`
    #[must_use]
    pub fn provider_health(&self, address: &str) -> Option<ProviderHealth> {
        self.providers
            .iter()
            .find(|provider| provider.address == address)
            .map(Provider::health)
    }

    /// Drop the fallback HTTP client.
    /// It is created again if the fallback is needed afterwards.
    pub fn close(&self) {
        if self.fallback.close() {
            log::info!("Closed fallback HTTP client");
        }
    }

    /// Snapshot of resolver statistics
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            cache: self.cache.stats(),
            providers: self
                .providers
                .iter()
                .map(|provider| provider.stats(self.policy))
                .collect(),
            strategy: self.rotation.strategy(),
            current_index: self.rotation.current_index(),
            fallback_endpoints: self.fallback.endpoint_count(),
            fallback_open: self.fallback.is_open(),
        }
    }
}

/// Statistics of a [`Resolver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Cache statistics
    pub cache: CacheStats,
    /// Per-provider statistics in configuration order
    pub providers: Vec<ProviderStats>,
    /// Configured rotation strategy
    pub strategy: RotationStrategy,
    /// Next round-robin position
    pub current_index: usize,
    /// Number of configured fallback endpoints
    pub fallback_endpoints: usize,
    /// Whether the fallback HTTP client is currently open
    pub fallback_open: bool,
}
