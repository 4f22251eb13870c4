use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

/// Possible errors when interacting with `netgate_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Every configured provider and fallback endpoint failed for a hostname.
    /// This is terminal for the call; nothing is retried internally.
    #[error(
        "Failed to resolve {hostname} after trying {providers_tried} providers. Last error: {}",
        .last_error.as_ref().map_or_else(|| "none".to_string(), ToString::to_string)
    )]
    Resolution {
        /// The hostname that could not be resolved
        hostname: String,
        /// Number of direct providers that were actually queried
        providers_tried: usize,
        /// The last underlying failure, if any attempt was made
        last_error: Option<LookupError>,
    },

    /// The configuration cannot work, e.g. a fallback endpoint that is not
    /// a valid URL or a rate limit factor that is out of range.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A slot operation referenced a client name that was never registered
    #[error("Client '{0}' is not registered")]
    UnknownClient(String),

    /// The coordinator was closed while waiting for, or before asking for,
    /// a slot
    #[error("Coordinator is closed")]
    Closed,

    /// The configuration file could not be read
    #[error("Failed to read configuration file `{}`: {}", .0.display(), .1)]
    ReadConfig(PathBuf, #[source] std::io::Error),

    /// The configuration file is not valid TOML or has unknown keys
    #[error("Failed to parse configuration file: {0}")]
    ParseConfig(#[from] toml::de::Error),
}

impl ErrorKind {
    /// Returns `true` if this error is a terminal resolution failure
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Resolution {
                    hostname: h1,
                    providers_tried: p1,
                    last_error: e1,
                },
                Self::Resolution {
                    hostname: h2,
                    providers_tried: p2,
                    last_error: e2,
                },
            ) => h1 == h2 && p1 == p2 && e1 == e2,
            (Self::Configuration(a), Self::Configuration(b))
            | (Self::UnknownClient(a), Self::UnknownClient(b)) => a == b,
            (Self::ReadConfig(p1, e1), Self::ReadConfig(p2, e2)) => {
                p1 == p2 && e1.kind() == e2.kind()
            }
            (Self::ParseConfig(e1), Self::ParseConfig(e2)) => e1.to_string() == e2.to_string(),
            (Self::Closed, Self::Closed) => true,
            _ => false,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A single failed lookup against one provider or fallback endpoint.
///
/// These never reach callers directly. The resolver records them against
/// provider health and keeps the last one for [`ErrorKind::Resolution`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The lookup did not finish within the configured timeout
    #[error("Timeout resolving {hostname} via {via}")]
    Timeout {
        /// Hostname being resolved
        hostname: String,
        /// Provider or endpoint that was queried
        via: String,
    },

    /// The answer contained no usable address
    #[error("No address records for {0}")]
    NoRecords(String),

    /// The upstream answered with an error
    #[error("DNS error for {hostname}: {reason}")]
    Resolve {
        /// Hostname being resolved
        hostname: String,
        /// Error reported by the upstream
        reason: String,
    },

    /// A provider entry is neither an IP address nor a socket address
    #[error("Invalid provider address `{0}`")]
    InvalidProvider(String),

    /// A fallback endpoint could not be reached or returned garbage
    #[error("Fallback request to {endpoint} failed: {reason}")]
    Fallback {
        /// Fallback endpoint URL
        endpoint: String,
        /// Transport or decoding failure
        reason: String,
    },

    /// A fallback endpoint is not a valid URL
    #[error("Invalid fallback endpoint `{0}`")]
    InvalidEndpoint(String),

    /// No fallback endpoint is configured
    #[error("No fallback endpoints configured")]
    NoEndpoints,
}

impl LookupError {
    /// Configuration problems are surfaced to the caller instead of being
    /// treated as a transient upstream failure.
    #[must_use]
    pub(crate) const fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidEndpoint(_))
    }
}
