//! Direct name lookups against a single upstream.
//!
//! [`Lookup`] is the seam between the resolver (or the health monitor) and
//! the actual transport. The default transport is [`HickoryLookup`], built
//! on `hickory-resolver`.

use async_trait::async_trait;
use hickory_resolver::{
    TokioResolver,
    config::{LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use std::fmt::{self, Debug};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::types::LookupError;

/// Default DNS port used when a provider is given as a bare IP address
const DNS_PORT: u16 = 53;

/// Resolve a hostname to a single IPv4 address via one upstream
#[async_trait]
pub trait Lookup: Send + Sync + Debug {
    /// Look up the first address record of `hostname`.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] if the upstream cannot answer, answers with
    /// an error, or answers without any address record.
    async fn lookup(&self, hostname: &str) -> Result<IpAddr, LookupError>;
}

/// A [`Lookup`] backed by a `hickory-resolver` instance.
///
/// Provider lookups use exactly one nameserver with hickory's own cache
/// disabled, so results are only ever cached by the
/// [`ResolutionCache`](crate::dns::ResolutionCache).
pub struct HickoryLookup {
    resolver: Option<TokioResolver>,
    upstream: String,
}

impl HickoryLookup {
    /// Build a lookup that only queries `provider`.
    ///
    /// `provider` is either an IP address (port 53) or a socket address.
    /// An unparsable provider is not rejected here; every lookup through it
    /// fails with [`LookupError::InvalidProvider`] instead.
    #[must_use]
    pub fn provider(provider: &str, timeout: Duration) -> Self {
        let Some(address) = parse_provider(provider) else {
            log::warn!("Provider `{provider}` is not a valid IP or socket address");
            return Self {
                resolver: None,
                upstream: provider.to_string(),
            };
        };

        let name_servers =
            NameServerConfigGroup::from_ips_clear(&[address.ip()], address.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], name_servers);
        let resolver =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
                .with_options(lookup_options(timeout))
                .build();

        Self {
            resolver: Some(resolver),
            upstream: provider.to_string(),
        }
    }

    /// Build a lookup using the system's resolver configuration.
    ///
    /// Falls back to hickory's default upstreams if the system configuration
    /// cannot be read.
    #[must_use]
    pub fn system(timeout: Duration) -> Self {
        let builder = TokioResolver::builder_tokio().unwrap_or_else(|e| {
            log::warn!("Cannot read system resolver configuration, using defaults: {e}");
            TokioResolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            )
        });

        Self {
            resolver: Some(builder.with_options(lookup_options(timeout)).build()),
            upstream: "system".to_string(),
        }
    }

    /// The upstream this lookup queries
    #[must_use]
    pub fn upstream(&self) -> &str {
        &self.upstream
    }
}

impl Debug for HickoryLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HickoryLookup")
            .field("upstream", &self.upstream)
            .field("valid", &self.resolver.is_some())
            .finish()
    }
}

#[async_trait]
impl Lookup for HickoryLookup {
    async fn lookup(&self, hostname: &str) -> Result<IpAddr, LookupError> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| LookupError::InvalidProvider(self.upstream.clone()))?;

        let answer = resolver
            .lookup_ip(hostname)
            .await
            .map_err(|e| LookupError::Resolve {
                hostname: hostname.to_string(),
                reason: e.to_string(),
            })?;

        answer
            .iter()
            .next()
            .ok_or_else(|| LookupError::NoRecords(hostname.to_string()))
    }
}

fn lookup_options(timeout: Duration) -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    opts.ip_strategy = LookupIpStrategy::Ipv4Only;
    opts
}

/// Parse `1.1.1.1` or `1.1.1.1:5353` (and the IPv6 equivalents)
fn parse_provider(provider: &str) -> Option<SocketAddr> {
    let provider = provider.trim();
    provider.parse::<SocketAddr>().ok().or_else(|| {
        provider
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, DNS_PORT))
    })
}
