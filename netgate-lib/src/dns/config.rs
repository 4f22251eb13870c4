use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::cache::{DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL};
use super::provider::RotationStrategy;

/// Public resolvers queried directly, in rotation order
pub const DEFAULT_PROVIDERS: [&str; 4] = ["1.1.1.1", "8.8.8.8", "9.9.9.9", "208.67.222.222"];

/// JSON DNS-over-HTTPS endpoints used when every direct provider failed
pub const DEFAULT_FALLBACK_ENDPOINTS: [&str; 2] = [
    "https://cloudflare-dns.com/dns-query",
    "https://dns.google/dns-query",
];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(60);

/// Configuration of the [`Resolver`](crate::dns::Resolver)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Upstream providers as IP addresses or `ip:port`
    pub providers: Vec<String>,

    /// Fallback endpoints speaking the JSON DNS API
    pub fallback_endpoints: Vec<String>,

    /// How the next provider is picked
    pub strategy: RotationStrategy,

    /// Lifetime of cached resolutions
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Maximum number of cached hostnames
    pub cache_size: usize,

    /// Timeout of a single direct lookup
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Timeout of a single fallback request
    #[serde(with = "humantime_serde")]
    pub fallback_timeout: Duration,

    /// Consecutive failures after which a provider is skipped
    pub failure_threshold: u32,

    /// Time after the last failure before a skipped provider is tried again
    #[serde(with = "humantime_serde")]
    pub recovery_window: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            providers: DEFAULT_PROVIDERS.iter().map(ToString::to_string).collect(),
            fallback_endpoints: DEFAULT_FALLBACK_ENDPOINTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            strategy: RotationStrategy::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_size: DEFAULT_CACHE_SIZE,
            timeout: DEFAULT_TIMEOUT,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
        }
    }
}
