//! Proxy configuration.

use std::time::Duration;

/// Default upstream gateway endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8317/api/provider/agy";

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Default cap on inbound request bodies (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Immutable settings shared by every request of one proxy instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Base URL requests are forwarded to; the inbound path and query are appended.
    pub upstream_url: String,
    /// Log per-request diagnostics.
    pub verbose: bool,
    /// Per-request timeout, measured from send.
    pub timeout: Duration,
    /// Maximum inbound request body size.
    pub max_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            verbose: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ProxyConfig {
    pub fn new(upstream_url: impl Into<String>) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            ..Self::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProxyConfig::new("http://127.0.0.1:9999/test");
        assert_eq!(config.upstream_url, "http://127.0.0.1:9999/test");
        assert!(!config.verbose);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn builder_overrides() {
        let config = ProxyConfig::default()
            .with_verbose(true)
            .with_timeout_ms(60_000)
            .with_max_body_bytes(64);
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert!(config.verbose);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_body_bytes, 64);
    }
}
