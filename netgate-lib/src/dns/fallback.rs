//! DNS-over-HTTPS fallback using the JSON API flavour
//! (`GET <endpoint>?name=<host>&type=A` with `Accept: application/dns-json`).

use http::header::ACCEPT;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

use crate::types::LookupError;

const DNS_JSON_MEDIA_TYPE: &str = "application/dns-json";

/// Record type of an IPv4 address answer
const RECORD_TYPE_A: u16 = 1;

#[derive(Debug, Deserialize)]
struct DnsJsonResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DnsJsonAnswer>,
}

#[derive(Debug, Deserialize)]
struct DnsJsonAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl DnsJsonResponse {
    fn first_address(&self) -> Option<IpAddr> {
        self.answer
            .iter()
            .filter(|answer| answer.record_type == RECORD_TYPE_A)
            .find_map(|answer| answer.data.parse().ok())
    }
}

/// The fallback path of the resolver.
///
/// The HTTP client is created on first use and dropped by [`Fallback::close`],
/// so a resolver that never needs the fallback never opens a connection pool.
#[derive(Debug)]
pub(crate) struct Fallback {
    endpoints: Vec<String>,
    timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl Fallback {
    pub(crate) fn new(endpoints: Vec<String>, timeout: Duration) -> Self {
        Self {
            endpoints,
            timeout,
            client: Mutex::new(None),
        }
    }

    pub(crate) fn is_configured(&self) -> bool {
        !self.endpoints.is_empty()
    }

    pub(crate) fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.client.lock().is_some()
    }

    /// Drop the HTTP client. Returns whether one was open.
    pub(crate) fn close(&self) -> bool {
        self.client.lock().take().is_some()
    }

    /// Query every endpoint in order until one returns an A record.
    ///
    /// An endpoint that is not a valid URL aborts immediately with
    /// [`LookupError::InvalidEndpoint`]; any other failure moves on to the
    /// next endpoint.
    pub(crate) async fn resolve(&self, hostname: &str) -> Result<IpAddr, LookupError> {
        let mut last_error = LookupError::NoEndpoints;

        for endpoint in &self.endpoints {
            let url = Url::parse(endpoint)
                .map_err(|_| LookupError::InvalidEndpoint(endpoint.clone()))?;

            match self.query(url, hostname).await {
                Ok(address) => return Ok(address),
                Err(e) => {
                    log::warn!("Fallback lookup of {hostname} via {endpoint} failed: {e}");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn query(&self, url: Url, hostname: &str) -> Result<IpAddr, LookupError> {
        let endpoint = url.to_string();
        let failed = |reason: String| LookupError::Fallback {
            endpoint: endpoint.clone(),
            reason,
        };

        let response = self
            .client()
            .map_err(|e| failed(e.to_string()))?
            .get(url)
            .query(&[("name", hostname), ("type", "A")])
            .header(ACCEPT, DNS_JSON_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LookupError::Timeout {
                        hostname: hostname.to_string(),
                        via: endpoint.clone(),
                    }
                } else {
                    failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("unexpected status {status}")));
        }

        let body: DnsJsonResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
        body.first_address()
            .ok_or_else(|| LookupError::NoRecords(hostname.to_string()))
    }

    /// The shared HTTP client, created if necessary
    fn client(&self) -> Result<Client, reqwest::Error> {
        let mut client = self.client.lock();
        if let Some(client) = client.as_ref() {
            return Ok(client.clone());
        }

        log::debug!("Opening fallback HTTP client");
        let created = Client::builder().timeout(self.timeout).build()?;
        *client = Some(created.clone());
        Ok(created)
    }
}
