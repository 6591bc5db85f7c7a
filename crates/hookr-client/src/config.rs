//! Relay client configuration.

use std::fmt;
use std::time::Duration;

/// Default hookR events endpoint.
pub const DEFAULT_URL: &str = "wss://web.hookr.cloud/events";

/// Configuration for a [`RelayClient`](crate::RelayClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint (e.g. `"wss://web.hookr.cloud/events"`).
    pub url: String,

    /// Client API key presented during the handshake.
    pub client_key: String,

    /// Bound on the TCP connect + TLS + upgrade handshake.
    pub connect_timeout: Duration,

    /// Interval between WebSocket pings. `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,

    /// Bound on sending the close frame during shutdown.
    pub close_timeout: Duration,

    /// Reconnection policy. `None` makes a mid-session drop fatal.
    pub reconnect: Option<ReconnectPolicy>,
}

impl ClientConfig {
    /// Create a config with required fields and defaults.
    pub fn new(url: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_key: client_key.into(),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Some(Duration::from_secs(30)),
            close_timeout: Duration::from_secs(2),
            reconnect: Some(ReconnectPolicy::default()),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("client_key", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("close_timeout", &self.close_timeout)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

/// Exponential backoff reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial delay before first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Multiplier applied to delay after each failed attempt.
    pub multiplier: f64,
    /// Maximum number of reconnect attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: Some(5),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Whether another attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_attempts, Some(5));
    }

    #[test]
    fn exponential_backoff_delays() {
        let policy = ReconnectPolicy::default();

        // 1s, 2s, 4s, 8s, 16s, 30s (capped)
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn retry_with_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn retry_unlimited() {
        let policy = ReconnectPolicy {
            max_attempts: None,
            ..Default::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(u32::MAX));
    }

    #[test]
    fn client_config_new() {
        let config = ClientConfig::new(DEFAULT_URL, "key-123");
        assert_eq!(config.url, "wss://web.hookr.cloud/events");
        assert_eq!(config.client_key, "key-123");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.reconnect.is_some());
    }

    #[test]
    fn debug_redacts_client_key() {
        let config = ClientConfig::new(DEFAULT_URL, "super-secret-key");
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("super-secret-key"));
        assert!(dbg.contains("<redacted>"));
    }
}
