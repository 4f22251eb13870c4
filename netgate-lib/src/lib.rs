//! `netgate` coordinates outbound network access of concurrent clients.
//!
//! It bundles a caching multi-provider DNS resolver with a DNS-over-HTTPS
//! fallback, a background health monitor for name resolution, a
//! per-destination adaptive rate limiter and a [`Coordinator`] that bounds
//! the concurrency of every client and of all clients together.
//!
//! ```no_run
//! use netgate_lib::{Coordinator, CoordinatorConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let coordinator = Coordinator::new(CoordinatorConfig::default());
//!   coordinator.register_client("crawler", Some(2));
//!   coordinator.start_monitoring();
//!
//!   {
//!     let _slot = coordinator.slot("crawler").await?;
//!     let address = coordinator.resolve("example.com").await?;
//!     coordinator.rate_limit("example.com").await;
//!     println!("example.com is at {address}");
//!   }
//!
//!   coordinator.close().await;
//!   Ok(())
//! }
//! ```
//!
//! The components can be used on their own as well, see [`dns`],
//! [`monitor`] and [`ratelimit`].
#![warn(missing_docs)]

mod types;

pub mod coordinator;
pub mod dns;
pub mod monitor;
pub mod ratelimit;

#[cfg(test)]
pub(crate) mod test_utils;

pub use coordinator::{
    ClientSnapshot, ClientStatus, Coordinator, CoordinatorBuilder, CoordinatorConfig,
    CoordinatorStats, SlotGuard,
};
pub use dns::{Lookup, Resolver, ResolverConfig, RotationStrategy};
pub use monitor::{HealthMonitor, MonitorConfig, MonitorStatus};
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use types::{ErrorKind, LookupError, Result};
