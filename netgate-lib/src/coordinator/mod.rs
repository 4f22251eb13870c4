//! Shared coordination of concurrent clients.
//!
//! A [`Coordinator`] hands out slots within per-client and global budgets,
//! pauses work while name resolution is unhealthy and gives every client
//! access to the shared [`Resolver`](crate::dns::Resolver) and
//! [`RateLimiter`](crate::ratelimit::RateLimiter).

#![allow(clippy::module_inception)]

mod config;
mod coordinator;
mod slot;

pub use config::{CoordinatorConfig, DEFAULT_CLIENT_BUDGET, DEFAULT_MAX_GLOBAL_CONNECTIONS};
pub use coordinator::{Coordinator, CoordinatorBuilder, CoordinatorStats, GlobalConnections};
pub use slot::{ClientSnapshot, ClientStatus, SlotGuard};
