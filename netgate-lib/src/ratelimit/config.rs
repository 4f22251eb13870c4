use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Delay between requests to a destination without a configured delay
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Delay that throttling escalates from when the current delay is smaller
const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(500);

/// Upper bound of an escalated delay
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

const DEFAULT_INCREASE_FACTOR: f64 = 1.5;
const DEFAULT_DECREASE_FACTOR: f64 = 0.9;

/// Per-destination base delays, keyed by lowercase hostname
pub type DestinationDelays = HashMap<String, Duration>;

/// Configuration of the [`RateLimiter`](crate::ratelimit::RateLimiter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Base delay of destinations not listed in `delays`
    #[serde(with = "humantime_serde")]
    pub default_delay: Duration,

    /// Base delays of specific destinations
    #[serde(with = "delay_map")]
    pub delays: DestinationDelays,

    /// Starting point for escalation when the current delay is below it
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    /// Escalated delays never exceed this
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Multiplier applied on throttling
    pub increase_factor: f64,

    /// Multiplier applied on success while above the base delay
    pub decrease_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay: DEFAULT_DELAY,
            delays: DestinationDelays::new(),
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            increase_factor: DEFAULT_INCREASE_FACTOR,
            decrease_factor: DEFAULT_DECREASE_FACTOR,
        }
    }
}

impl RateLimitConfig {
    /// Check that the adaptation knobs describe a usable range.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Configuration`] if a factor is not finite,
    /// `increase_factor` is below one, `decrease_factor` is not in `(0, 1]`,
    /// or `min_delay` exceeds `max_delay`.
    pub fn validate(&self) -> Result<()> {
        if !self.increase_factor.is_finite() || self.increase_factor < 1.0 {
            return Err(ErrorKind::Configuration(format!(
                "rate_limit.increase_factor must be a finite number of at least 1.0, got {}",
                self.increase_factor
            )));
        }
        if !self.decrease_factor.is_finite()
            || self.decrease_factor <= 0.0
            || self.decrease_factor > 1.0
        {
            return Err(ErrorKind::Configuration(format!(
                "rate_limit.decrease_factor must be greater than 0.0 and at most 1.0, got {}",
                self.decrease_factor
            )));
        }
        if self.min_delay > self.max_delay {
            return Err(ErrorKind::Configuration(format!(
                "rate_limit.min_delay ({:?}) exceeds rate_limit.max_delay ({:?})",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// (De)serialize a map of humantime durations, normalizing keys to lowercase
mod delay_map {
    use humantime_serde::Serde;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    pub(super) fn serialize<S>(
        delays: &HashMap<String, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(delays.len()))?;
        for (destination, delay) in delays {
            map.serialize_entry(destination, &Serde::from(*delay))?;
        }
        map.end()
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<String, Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let delays = HashMap::<String, Serde<Duration>>::deserialize(deserializer)?;
        Ok(delays
            .into_iter()
            .map(|(destination, delay)| (destination.to_lowercase(), delay.into_inner()))
            .collect())
    }
}
