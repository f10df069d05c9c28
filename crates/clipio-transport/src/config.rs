//! Transport configuration.

use std::time::Duration;

use clipio_core::config::{RelayConfig, SessionConfig};

/// Timers driving retransmission, deferred sends and reconnection.
///
/// Reconnection uses a fixed delay with no growth and no attempt cap: relay
/// outages are tolerated for as long as the session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Delay before an unacknowledged message is sent again.
    pub retransmit_interval: Duration,
    /// Delay before a send queued behind an outstanding message is retried.
    pub send_later_interval: Duration,
    /// Delay before a dropped subscription is reopened.
    pub reconnect_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            retransmit_interval: Duration::from_secs(10),
            send_later_interval: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl From<&SessionConfig> for SessionTiming {
    fn from(config: &SessionConfig) -> Self {
        Self {
            retransmit_interval: config.retransmit_interval(),
            send_later_interval: config.send_later_interval(),
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

/// Where the relay accepts publications and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoints {
    /// Publish base (`POST {http_url}/{channel}`).
    pub http_url: String,
    /// Subscribe base (`{ws_url}/{channel}/ws`).
    pub ws_url: String,
}

impl Default for RelayEndpoints {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for RelayEndpoints {
    fn from(config: &RelayConfig) -> Self {
        Self {
            http_url: config.http_url.trim_end_matches('/').to_string(),
            ws_url: config.ws_url.trim_end_matches('/').to_string(),
        }
    }
}

impl RelayEndpoints {
    pub fn publish_url(&self, channel_id: &str) -> String {
        format!("{}/{channel_id}", self.http_url)
    }

    pub fn subscribe_url(&self, channel_id: &str) -> String {
        format!("{}/{channel_id}/ws", self.ws_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing() {
        let timing = SessionTiming::default();
        assert_eq!(timing.retransmit_interval, Duration::from_secs(10));
        assert_eq!(timing.send_later_interval, Duration::from_secs(10));
        assert_eq!(timing.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn timing_from_config() {
        let config = SessionConfig {
            retransmit_interval_ms: 250,
            send_later_interval_ms: 500,
            reconnect_delay_ms: 100,
        };
        let timing = SessionTiming::from(&config);
        assert_eq!(timing.retransmit_interval, Duration::from_millis(250));
        assert_eq!(timing.send_later_interval, Duration::from_millis(500));
        assert_eq!(timing.reconnect_delay, Duration::from_millis(100));
    }

    #[test]
    fn endpoint_urls_strip_trailing_slash() {
        let endpoints = RelayEndpoints::from(&RelayConfig {
            http_url: "https://relay.example/".into(),
            ws_url: "wss://relay.example/".into(),
            ..RelayConfig::default()
        });
        assert_eq!(endpoints.publish_url("abc"), "https://relay.example/abc");
        assert_eq!(endpoints.subscribe_url("abc"), "wss://relay.example/abc/ws");
    }
}
