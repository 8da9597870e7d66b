//! Configuration for the sync client.

use rand::Rng;
use std::time::Duration;

/// Configuration for a sync client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint URL. Snapshot requests are resolved against it and transport
    /// implementations use it as the hub address.
    pub endpoint_url: String,
    /// Skip reconciliation and callbacks; only raw envelopes are delivered.
    pub suppress_processing: bool,
    /// Hand callers an independent copy of cached collections.
    pub deep_copy_on_delivery: bool,
    /// Primary identifier field used for record matching.
    pub primary_key: String,
    /// Alternate identifier field used for record matching.
    pub alternate_key: String,
    /// Reconnect automatically when the transport closes.
    pub auto_reconnect: bool,
    /// How long to wait for the session id after the transport starts.
    pub handshake_timeout: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Log decoded envelopes and snapshots in full.
    pub debug: bool,
}

impl ClientConfig {
    /// Creates a new client configuration with defaults.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            suppress_processing: false,
            deep_copy_on_delivery: false,
            primary_key: "id".into(),
            alternate_key: "Id".into(),
            auto_reconnect: true,
            handshake_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            debug: false,
        }
    }

    /// Sets whether reconciliation is skipped.
    pub fn with_suppress_processing(mut self, suppress: bool) -> Self {
        self.suppress_processing = suppress;
        self
    }

    /// Sets whether collections are deep-copied on delivery.
    pub fn with_deep_copy_on_delivery(mut self, deep_copy: bool) -> Self {
        self.deep_copy_on_delivery = deep_copy;
        self
    }

    /// Sets the identifier field names used for record matching.
    pub fn with_identifier_keys(
        mut self,
        primary: impl Into<String>,
        alternate: impl Into<String>,
    ) -> Self {
        self.primary_key = primary.into();
        self.alternate_key = alternate.into();
        self
    }

    /// Sets whether the client reconnects automatically.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the reconnect configuration.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets debug logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Resolves the snapshot URL for a feed.
    ///
    /// Absolute feed URLs are used as they are.
    pub fn snapshot_url(&self, feed: &str) -> String {
        if feed.starts_with("http://") || feed.starts_with("https://") {
            return feed.to_string();
        }
        format!(
            "{}/{}",
            self.endpoint_url.trim_end_matches('/'),
            feed.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Reconnect backoff: a fixed base delay plus uniform jitter.
///
/// The delay does not grow between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Minimum delay before the next attempt.
    pub base_delay: Duration,
    /// Width of the random jitter added to the base delay.
    pub variance: Duration,
}

impl ReconnectConfig {
    /// Creates a new reconnect configuration.
    pub fn new(base_delay: Duration, variance: Duration) -> Self {
        Self {
            base_delay,
            variance,
        }
    }

    /// Creates a configuration that always waits exactly `base_delay`.
    pub fn no_jitter(base_delay: Duration) -> Self {
        Self::new(base_delay, Duration::ZERO)
    }

    /// Returns a delay in `[base_delay, base_delay + variance)`.
    pub fn delay(&self) -> Duration {
        self.delay_with(&mut rand::thread_rng())
    }

    /// Like [`delay`](Self::delay) with a caller-provided RNG.
    pub fn delay_with<R: Rng>(&self, rng: &mut R) -> Duration {
        let variance_ms = u64::try_from(self.variance.as_millis()).unwrap_or(u64::MAX);
        if variance_ms == 0 {
            return self.base_delay;
        }
        let jitter = Duration::from_millis(rng.gen_range(0..variance_ms));
        self.base_delay.checked_add(jitter).unwrap_or(Duration::MAX)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(3))
    }
}
