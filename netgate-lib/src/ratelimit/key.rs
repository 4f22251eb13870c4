use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A normalized rate limiting key, usually a hostname.
///
/// Keys are lowercase. Anything that looks like a URL is reduced to its host
/// (and explicit port), everything else is used as given.
///
/// # Examples
///
/// ```
/// use netgate_lib::ratelimit::DestinationKey;
///
/// let key = DestinationKey::from("https://API.Example.com/v1/items?page=2");
/// assert_eq!(key.as_str(), "api.example.com");
///
/// let key = DestinationKey::from("http://localhost:8080/health");
/// assert_eq!(key.as_str(), "localhost:8080");
///
/// let key = DestinationKey::from("Example.com");
/// assert_eq!(key.as_str(), "example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DestinationKey(String);

impl DestinationKey {
    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the key as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Candidate keys for looking up a configured delay, most specific first:
    /// the key itself, without `www.`, with `www.`, and the last two labels
    /// for deeper subdomains.
    pub(crate) fn lookup_candidates(&self) -> Vec<String> {
        let key = self.as_str();
        let mut candidates = vec![key.to_string()];

        if let Some(stripped) = key.strip_prefix("www.") {
            candidates.push(stripped.to_string());
        }
        candidates.push(format!("www.{key}"));

        let labels: Vec<&str> = key.split('.').collect();
        if labels.len() > 2 {
            candidates.push(labels[labels.len() - 2..].join("."));
        }
        candidates
    }
}

fn normalize(value: &str) -> String {
    let value = value.trim();
    if value.contains("://")
        && let Ok(url) = Url::parse(value)
        && let Some(host) = url.host_str()
    {
        return match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
        .to_lowercase();
    }
    value.to_lowercase()
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DestinationKey {
    fn from(value: String) -> Self {
        DestinationKey(normalize(&value))
    }
}

impl From<&str> for DestinationKey {
    fn from(value: &str) -> Self {
        DestinationKey(normalize(value))
    }
}

impl From<&Url> for DestinationKey {
    fn from(url: &Url) -> Self {
        DestinationKey::from(url.as_str())
    }
}

impl From<DestinationKey> for String {
    fn from(key: DestinationKey) -> Self {
        key.0
    }
}
