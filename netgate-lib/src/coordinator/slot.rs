use serde::Serialize;
use std::sync::Arc;
use strum::{Display, IntoStaticStr};
use tokio::sync::Semaphore;

use super::Coordinator;
use crate::types::percentage;

/// Activity of a registered client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClientStatus {
    /// Holds no slot
    #[default]
    Idle,
    /// Holds at least one slot
    Running,
    /// Work is paused through the pause gate
    Paused,
}

/// Concurrency budget and counters of one client
#[derive(Debug)]
pub(crate) struct ClientSlot {
    pub(crate) max_concurrent: usize,
    pub(crate) current: usize,
    pub(crate) status: ClientStatus,
    pub(crate) total_requests: u64,
    pub(crate) total_errors: u64,
    /// Permits still to be retired after the budget shrank while they were
    /// held. Released slots pay this off instead of returning their permit.
    pub(crate) pending_shrink: usize,
    pub(crate) gate: Arc<Semaphore>,
}

impl ClientSlot {
    pub(crate) fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            current: 0,
            status: ClientStatus::Idle,
            total_requests: 0,
            total_errors: 0,
            pending_shrink: 0,
            gate: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Change the budget without replacing the gate, so waiters and holders
    /// keep working against the same semaphore.
    pub(crate) fn resize(&mut self, max_concurrent: usize) {
        let old = self.max_concurrent;
        if max_concurrent > old {
            let grow = max_concurrent - old;
            let repaid = grow.min(self.pending_shrink);
            self.pending_shrink -= repaid;
            self.gate.add_permits(grow - repaid);
        } else if max_concurrent < old {
            let shrink = old - max_concurrent;
            let retired = self.gate.forget_permits(shrink);
            self.pending_shrink += shrink - retired;
        }
        self.max_concurrent = max_concurrent;
    }

    /// Give back one held slot. Returns `false` if none was held.
    pub(crate) fn release(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        if self.pending_shrink > 0 {
            self.pending_shrink -= 1;
        } else {
            self.gate.add_permits(1);
        }
        if self.current == 0 {
            self.status = ClientStatus::Idle;
        }
        true
    }

    pub(crate) fn snapshot(&self, name: &str) -> ClientSnapshot {
        ClientSnapshot {
            name: name.to_string(),
            status: self.status,
            current: self.current,
            max_concurrent: self.max_concurrent,
            total_requests: self.total_requests,
            total_errors: self.total_errors,
            error_rate: percentage(self.total_errors, self.total_requests.max(1)),
        }
    }
}

/// Point-in-time view of a registered client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSnapshot {
    /// Name the client registered with
    pub name: String,
    /// Current activity
    pub status: ClientStatus,
    /// Slots currently held
    pub current: usize,
    /// Concurrency budget
    pub max_concurrent: usize,
    /// Slots acquired since registration
    pub total_requests: u64,
    /// Errors reported for this client
    pub total_errors: u64,
    /// Errors per request as a formatted percentage
    pub error_rate: String,
}

/// A held slot that is released when dropped.
///
/// Created by [`Coordinator::slot`].
#[derive(Debug)]
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct SlotGuard {
    coordinator: Coordinator,
    client: String,
}

impl SlotGuard {
    pub(crate) const fn new(coordinator: Coordinator, client: String) -> Self {
        Self {
            coordinator,
            client,
        }
    }

    /// Name of the client holding the slot
    #[must_use]
    pub fn client(&self) -> &str {
        &self.client
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Err(e) = self.coordinator.release_slot(&self.client) {
            log::error!("Failed to release slot of {}: {e}", self.client);
        }
    }
}
