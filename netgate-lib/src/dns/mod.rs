//! Name resolution with caching, provider rotation and a DNS-over-HTTPS
//! fallback.
//!
//! - [`ResolutionCache`]: TTL and LRU bounded hostname cache
//! - [`Resolver`]: queries providers in rotation and tracks their health
//! - [`Lookup`]: the transport used for a single direct query
//! - [`ResolverConfig`]: providers, fallback endpoints, timeouts and thresholds

mod cache;
mod config;
mod fallback;
mod lookup;
mod provider;
mod resolver;

pub use cache::{CacheEntry, CacheStats, DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL, ResolutionCache};
pub use config::{DEFAULT_FALLBACK_ENDPOINTS, DEFAULT_PROVIDERS, ResolverConfig};
pub use lookup::{HickoryLookup, Lookup};
pub use provider::{ProviderHealth, ProviderStats, RotationStrategy};
pub use resolver::{Resolver, ResolverStats};
