//! Hostname to address cache with TTL expiry and LRU eviction.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::percentage;

/// Default time-to-live of a cached resolution
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of cached hostnames
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// A single cached resolution.
///
/// The entry is logically absent once its TTL has elapsed, even while it is
/// still physically stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// Resolved address
    pub address: IpAddr,
    /// When the entry was written
    pub created_at: Instant,
    /// Lifetime of the entry
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created_at))
    }
}

#[derive(Debug)]
struct CacheState {
    entries: LruCache<String, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Thread-safe LRU cache for hostname resolutions.
///
/// All reads and writes go through one lock, so a `get` followed by a `set`
/// on another task can never lose an update. Timekeeping uses
/// [`tokio::time::Instant`], which follows a paused test clock.
#[derive(Debug)]
pub struct ResolutionCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_SIZE)
    }
}

impl ResolutionCache {
    /// Create a cache with the given default TTL and capacity.
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            ttl,
            max_entries: capacity.get(),
        }
    }

    /// Look up a hostname.
    ///
    /// Expired entries are removed and reported as a miss. A hit moves the
    /// entry to the most-recently-used position.
    pub fn get(&self, hostname: &str) -> Option<IpAddr> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let Some(entry) = state.entries.get(hostname).copied() else {
            state.misses += 1;
            return None;
        };

        if entry.is_expired(now) {
            state.entries.pop(hostname);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        Some(entry.address)
    }

    /// Cache an address for a hostname, replacing any previous entry.
    ///
    /// If the cache is full and the hostname is new, the least recently used
    /// entry is evicted before inserting. `ttl` defaults to the cache TTL.
    pub fn set(&self, hostname: &str, address: IpAddr, ttl: Option<Duration>) {
        let entry = CacheEntry {
            address,
            created_at: Instant::now(),
            ttl: ttl.unwrap_or(self.ttl),
        };

        let mut state = self.state.lock();
        if !state.entries.contains(hostname) && state.entries.len() >= self.max_entries {
            if let Some((evicted, _)) = state.entries.pop_lru() {
                log::debug!("Evicted {evicted} from resolution cache");
                state.evictions += 1;
            }
        }
        state.entries.put(hostname.to_string(), entry);
    }

    /// Remove a hostname. Returns whether an entry was present.
    pub fn remove(&self, hostname: &str) -> bool {
        self.state.lock().entries.pop(hostname).is_some()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Remove all expired entries and return how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(hostname, _)| hostname.clone())
            .collect();

        for hostname in &expired {
            state.entries.pop(hostname.as_str());
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    /// Live entries with their remaining lifetime, most recently used first
    #[must_use]
    pub fn entries(&self) -> Vec<(String, IpAddr, Duration)> {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(hostname, entry)| (hostname.clone(), entry.address, entry.remaining(now)))
            .collect()
    }

    /// Number of stored entries, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no entries at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a hostname is physically stored (it may be expired).
    /// Does not affect recency.
    #[must_use]
    pub fn contains(&self, hostname: &str) -> bool {
        self.state.lock().entries.contains(hostname)
    }

    /// Snapshot of cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total_requests = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            max_entries: self.max_entries,
            ttl: self.ttl,
            hits: state.hits,
            misses: state.misses,
            hit_rate: percentage(state.hits, total_requests),
            evictions: state.evictions,
            expirations: state.expirations,
            total_requests,
        }
    }
}

/// Statistics of a [`ResolutionCache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Stored entries
    pub size: usize,
    /// Configured capacity
    pub max_entries: usize,
    /// Default TTL
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups not answered (absent or expired)
    pub misses: u64,
    /// Hit rate as a formatted percentage
    pub hit_rate: String,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Hits plus misses
    pub total_requests: u64,
}
