use async_trait::async_trait;
use netgate_lib::{Lookup, LookupError};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Answers every lookup with a fixed address while reachable
#[derive(Debug)]
pub struct FixedLookup {
    address: IpAddr,
    reachable: AtomicBool,
    calls: AtomicUsize,
}

impl FixedLookup {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.parse().unwrap(),
            reachable: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }

    #[allow(dead_code)]
    pub fn unreachable() -> Arc<Self> {
        let lookup = Self::new("127.0.0.1");
        lookup.set_reachable(false);
        lookup
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Lookup for FixedLookup {
    async fn lookup(&self, hostname: &str) -> Result<IpAddr, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(self.address)
        } else {
            Err(LookupError::Resolve {
                hostname: hostname.to_string(),
                reason: "unreachable".to_string(),
            })
        }
    }
}
