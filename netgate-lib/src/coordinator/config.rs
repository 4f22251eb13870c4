use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio::sync::Semaphore;

use crate::dns::ResolverConfig;
use crate::monitor::MonitorConfig;
use crate::ratelimit::RateLimitConfig;
use crate::{ErrorKind, Result};

/// Default upper bound of concurrent slots across all clients
pub const DEFAULT_MAX_GLOBAL_CONNECTIONS: usize = 6;

/// Budget of a client registered without an explicit budget or a
/// configured default
pub const DEFAULT_CLIENT_BUDGET: usize = 2;

/// Configuration of a [`Coordinator`](crate::coordinator::Coordinator).
///
/// Every field has a default, so a configuration file only needs to name
/// the values it changes:
///
/// ```toml
/// max_global_connections = 4
///
/// [client_defaults]
/// crawler = 3
///
/// [resolver]
/// strategy = "health_based"
/// cache_ttl = "10m"
///
/// [rate_limit]
/// default_delay = "1.5s"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Upper bound of concurrent slots across all clients
    pub max_global_connections: usize,

    /// Budgets of clients registered without an explicit budget, by name
    pub client_defaults: HashMap<String, usize>,

    /// Pause all clients when resolution turns unhealthy and resume them
    /// once it recovers
    pub auto_pause: bool,

    /// Name resolution
    pub resolver: ResolverConfig,

    /// Background health monitoring
    pub monitor: MonitorConfig,

    /// Per-destination pacing
    pub rate_limit: RateLimitConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_global_connections: DEFAULT_MAX_GLOBAL_CONNECTIONS,
            client_defaults: HashMap::new(),
            auto_pause: true,
            resolver: ResolverConfig::default(),
            monitor: MonitorConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load the configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a valid
    /// configuration (including unknown keys) or fails [`Self::validate`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).map_err(|e| ErrorKind::ReadConfig(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every budget can be enforced and that the rate limit
    /// settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Configuration`] if `max_global_connections` or a
    /// client default is zero or larger than [`Semaphore::MAX_PERMITS`], or
    /// if [`RateLimitConfig::validate`] fails.
    pub fn validate(&self) -> Result<()> {
        check_budget("max_global_connections", self.max_global_connections)?;
        for (name, budget) in &self.client_defaults {
            check_budget(&format!("client_defaults.{name}"), *budget)?;
        }
        self.rate_limit.validate()
    }

    /// Budget of a client registered without an explicit budget
    pub(crate) fn client_budget(&self, name: &str) -> usize {
        self.client_defaults
            .get(name)
            .copied()
            .unwrap_or(DEFAULT_CLIENT_BUDGET)
    }
}

fn check_budget(what: &str, budget: usize) -> Result<()> {
    if (1..=Semaphore::MAX_PERMITS).contains(&budget) {
        Ok(())
    } else {
        Err(ErrorKind::Configuration(format!(
            "{what} must be between 1 and {}, got {budget}",
            Semaphore::MAX_PERMITS
        )))
    }
}
