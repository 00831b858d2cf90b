//! Coordinator configuration.
//!
//! The two tunables workers actually need — the poll interval and the
//! per-worker fetch rate ceiling — plus the fetch worker pool size needed
//! to actually start a pool. Serde defaults plus env var overrides: an
//! explicit configuration record passed to the coordinator constructor,
//! rather than process-wide global flags.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::coordinator::Coordinator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// How long a worker waits for input before running its `handle_nothing`
    /// hook. Default 1s, matching the original `--polltime` flag default.
    #[serde(default = "default_poll_interval_ms", with = "duration_millis")]
    pub poll_interval: Duration,

    /// Maximum fetches per second, per fetch worker. Default 1.0, matching
    /// the original `--fetch_frequency` flag default.
    #[serde(default = "default_fetch_frequency_hz")]
    pub fetch_frequency_hz: f64,

    /// Number of fetch worker tasks to run. The original `GetCoordinator()`
    /// factory hardcoded two `FetchThread`s; this is that count made
    /// configurable.
    #[serde(default = "default_fetch_worker_count")]
    pub fetch_worker_count: usize,

    /// Bounded channel capacity for each worker pool's input queue.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_ms() -> Duration {
    Duration::from_secs(1)
}

fn default_fetch_frequency_hz() -> f64 {
    1.0
}

fn default_fetch_worker_count() -> usize {
    2
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl Config {
    /// Base default without env overrides (kept separate to avoid recursion
    /// in `with_env_overrides`, same split `LlmConfig` uses).
    pub fn base_default() -> Self {
        Self {
            poll_interval: default_poll_interval_ms(),
            fetch_frequency_hz: default_fetch_frequency_hz(),
            fetch_worker_count: default_fetch_worker_count(),
            channel_capacity: default_channel_capacity(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `WORKYARD_POLL_INTERVAL_MS`: poll interval in milliseconds
    /// - `WORKYARD_FETCH_FREQUENCY_HZ`: fetch rate ceiling per worker
    /// - `WORKYARD_FETCH_WORKERS`: number of fetch worker tasks
    /// - `WORKYARD_CHANNEL_CAPACITY`: bounded channel capacity
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("WORKYARD_POLL_INTERVAL_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.poll_interval = Duration::from_millis(ms);
            }
        }
        if let Ok(val) = std::env::var("WORKYARD_FETCH_FREQUENCY_HZ") {
            if let Ok(hz) = val.parse::<f64>() {
                self.fetch_frequency_hz = hz;
            }
        }
        if let Ok(val) = std::env::var("WORKYARD_FETCH_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                self.fetch_worker_count = n;
            }
        }
        if let Ok(val) = std::env::var("WORKYARD_CHANNEL_CAPACITY") {
            if let Ok(n) = val.parse::<usize>() {
                self.channel_capacity = n;
            }
        }
        self
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::base_default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.fetch_frequency_hz, 1.0);
        assert_eq!(config.fetch_worker_count, 2);
    }
}
