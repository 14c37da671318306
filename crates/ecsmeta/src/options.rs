//! Fetch options and backoff policy.
//!
//! Responsibilities:
//! - Discover the metadata endpoint from the environment.
//! - Hold the retry ceiling, backoff interval and jitter factor.
//!
//! Invariants:
//! - `ECS_CONTAINER_METADATA_URI_V4` wins over `ECS_CONTAINER_METADATA_URI`;
//!   either gets `/task` appended.
//! - The v2 endpoint is only used when nothing else is configured.

use rand::Rng;
use std::time::Duration;

pub const ENV_METADATA_URI: &str = "ECS_CONTAINER_METADATA_URI";
pub const ENV_METADATA_URI_V4: &str = "ECS_CONTAINER_METADATA_URI_V4";
pub const V2_ENDPOINT: &str = "http://169.254.170.2/v2/metadata";

pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_JITTER_FACTOR: f64 = 0.5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how to fetch task metadata.
#[derive(Debug, Clone)]
pub struct MetadataOptions {
    endpoint: Option<String>,
    max_retries: usize,
    interval: Duration,
    max_interval: Duration,
    jitter_factor: f64,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self::from_env()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl MetadataOptions {
    /// Options with the endpoint taken from the ECS environment variables.
    pub fn from_env() -> Self {
        let endpoint = non_empty_var(ENV_METADATA_URI_V4)
            .or_else(|| non_empty_var(ENV_METADATA_URI))
            .map(|base| format!("{base}/task"));
        Self {
            endpoint,
            max_retries: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch from `endpoint` verbatim, ignoring the environment.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Fall back to the v2 endpoint when no other endpoint is set.
    pub fn with_v2(mut self) -> Self {
        if self.endpoint.is_none() {
            self.endpoint = Some(V2_ENDPOINT.to_string());
        }
        self
    }

    /// Retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay before the first retry; doubled on each further retry.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Spread of the random jitter, as a fraction of the delay (0.0 to 1.0).
    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = if jitter_factor.is_nan() {
            0.0
        } else {
            jitter_factor.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Delay before retry number `retry` (0-based), before jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.interval
            .checked_mul(factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }

    /// Delay before retry number `retry`, with jitter applied.
    pub(crate) fn backoff_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let spread = rand::rng().random_range(-self.jitter_factor..=self.jitter_factor);
        base.mul_f64(1.0 + spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_v4_endpoint_preferred() {
        temp_env::with_vars(
            [
                (ENV_METADATA_URI, Some("http://v3.local")),
                (ENV_METADATA_URI_V4, Some("http://v4.local")),
            ],
            || {
                let options = MetadataOptions::from_env();
                assert_eq!(options.endpoint(), Some("http://v4.local/task"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_v3_endpoint_when_v4_empty() {
        temp_env::with_vars(
            [
                (ENV_METADATA_URI, Some("http://v3.local")),
                (ENV_METADATA_URI_V4, Some("")),
            ],
            || {
                let options = MetadataOptions::from_env();
                assert_eq!(options.endpoint(), Some("http://v3.local/task"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_v2_only_when_unconfigured() {
        temp_env::with_vars_unset([ENV_METADATA_URI, ENV_METADATA_URI_V4], || {
            assert_eq!(MetadataOptions::from_env().endpoint(), None);
            assert_eq!(MetadataOptions::from_env().with_v2().endpoint(), Some(V2_ENDPOINT));
            let explicit = MetadataOptions::from_env()
                .with_endpoint("http://explicit/task")
                .with_v2();
            assert_eq!(explicit.endpoint(), Some("http://explicit/task"));
        });
    }

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let options = MetadataOptions::from_env()
            .with_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(3));
        assert_eq!(options.base_delay(0), Duration::from_millis(500));
        assert_eq!(options.base_delay(1), Duration::from_secs(1));
        assert_eq!(options.base_delay(2), Duration::from_secs(2));
        assert_eq!(options.base_delay(3), Duration::from_secs(3));
        assert_eq!(options.base_delay(40), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_within_factor() {
        let options = MetadataOptions::from_env()
            .with_interval(Duration::from_millis(1000))
            .with_jitter_factor(0.5);
        for _ in 0..200 {
            let delay = options.backoff_delay(0);
            assert!(delay >= Duration::from_millis(500), "{delay:?}");
            assert!(delay <= Duration::from_millis(1500), "{delay:?}");
        }
        let exact = options.clone().with_jitter_factor(0.0);
        assert_eq!(exact.backoff_delay(1), Duration::from_secs(2));
    }
}
