use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dns::Lookup;
use crate::types::LookupError;

/// What a [`ScriptedLookup`] does on a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeed,
    Fail,
    /// Never answer, so the caller's timeout fires
    Hang,
}

/// A [`Lookup`] double that plays back scripted outcomes and counts calls
#[derive(Debug)]
pub(crate) struct ScriptedLookup {
    address: IpAddr,
    script: Mutex<VecDeque<Outcome>>,
    default: Mutex<Outcome>,
    failing_hosts: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedLookup {
    /// Answer every lookup with `address`
    pub(crate) fn always(address: &str) -> Self {
        Self::scripted(address, [])
    }

    /// Fail every lookup
    pub(crate) fn failing() -> Self {
        let lookup = Self::always("127.0.0.1");
        lookup.set_outcome(Outcome::Fail);
        lookup
    }

    /// Play back `outcomes` in order, then succeed
    pub(crate) fn scripted(address: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            address: address.parse().expect("valid test address"),
            script: Mutex::new(outcomes.into_iter().collect()),
            default: Mutex::new(Outcome::Succeed),
            failing_hosts: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Outcome once the script is exhausted
    pub(crate) fn set_outcome(&self, outcome: Outcome) {
        *self.default.lock() = outcome;
    }

    /// Always fail lookups of `hostname`
    pub(crate) fn fail_host(&self, hostname: &str) {
        self.failing_hosts.lock().insert(hostname.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lookup for ScriptedLookup {
    async fn lookup(&self, hostname: &str) -> Result<IpAddr, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let outcome = if self.failing_hosts.lock().contains(hostname) {
            Outcome::Fail
        } else {
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| *self.default.lock())
        };

        match outcome {
            Outcome::Succeed => Ok(self.address),
            Outcome::Fail => Err(LookupError::Resolve {
                hostname: hostname.to_string(),
                reason: "scripted failure".to_string(),
            }),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
