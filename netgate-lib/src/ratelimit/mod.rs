//! Per-destination pacing of outbound requests.
//!
//! - [`DestinationKey`]: normalized hostname used as the pacing key
//! - [`RateLimiter`]: enforces and adapts the delay between requests
//! - [`RateLimitConfig`]: base delays and adaptation knobs
//! - [`RateLimiterStats`]: statistics snapshot

mod config;
mod key;
mod limiter;
mod stats;

pub use config::{DestinationDelays, RateLimitConfig};
pub use key::DestinationKey;
pub use limiter::RateLimiter;
pub use stats::{DestinationSnapshot, RateLimiterStats};
