//! Builder pattern for constructing a [`ProgressClient`].

use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientParts, ProgressClient};
use crate::config::ClientConfig;
use crate::reconnect::ReconnectPolicy;
use crate::sink::ProgressSink;
use crate::types::ClientError;

/// Fluent builder for [`ProgressClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use jw_client::{ChannelSink, ProgressClient};
/// let (sink, _events) = ChannelSink::new();
/// let client = ProgressClient::builder("c-1", "wss://host/api/v2/ws/progress/c-1")
///     .sink(sink)
///     .heartbeat_interval(std::time::Duration::from_secs(30))
///     .build()
///     .unwrap();
/// ```
pub struct ProgressClientBuilder {
    client_id: String,
    target: String,
    sink: Option<Arc<dyn ProgressSink>>,
    reconnect_policy: ReconnectPolicy,
    heartbeat_interval: Option<Duration>,
    max_frame_bytes: usize,
    close_timeout: Duration,
}

impl ProgressClientBuilder {
    /// Identity and target are fixed for the lifetime of the client.
    pub fn new(client_id: impl Into<String>, target: impl Into<String>) -> Self {
        let defaults = ClientConfig::default();
        Self {
            client_id: client_id.into(),
            target: target.into(),
            sink: None,
            reconnect_policy: ReconnectPolicy::from(&defaults.reconnect),
            heartbeat_interval: defaults.heartbeat_interval(),
            max_frame_bytes: defaults.max_frame_bytes,
            close_timeout: defaults.close_timeout(),
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Where progress callbacks go.
    pub fn sink(mut self, sink: impl ProgressSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Share an existing sink between several clients.
    pub fn shared_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Apply every setting from a loaded [`ClientConfig`].
    pub fn config(mut self, cfg: &ClientConfig) -> Self {
        self.reconnect_policy = ReconnectPolicy::from(&cfg.reconnect);
        self.heartbeat_interval = cfg.heartbeat_interval();
        self.max_frame_bytes = cfg.max_frame_bytes;
        self.close_timeout = cfg.close_timeout();
        self
    }

    /// Override the reconnect policy (default: 2s linear, 5 attempts).
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Send a ping on this period while open (default: off).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = Some(d).filter(|d| !d.is_zero());
        self
    }

    /// Maximum inbound frame size (default 4 MB).
    pub fn max_frame_bytes(mut self, n: usize) -> Self {
        self.max_frame_bytes = n;
        self
    }

    /// How long `disconnect()` waits for the close frame to flush (default 1s).
    pub fn close_timeout(mut self, d: Duration) -> Self {
        self.close_timeout = d;
        self
    }

    /// Build the [`ProgressClient`].
    pub fn build(self) -> Result<ProgressClient, ClientError> {
        if self.client_id.trim().is_empty() {
            return Err(ClientError::Config("client_id is required".into()));
        }
        if !(self.target.starts_with("ws://") || self.target.starts_with("wss://")) {
            return Err(ClientError::Config(format!(
                "target must be a ws:// or wss:// URL, got {:?}",
                self.target
            )));
        }
        let sink = self
            .sink
            .ok_or_else(|| ClientError::Config("a progress sink is required".into()))?;

        Ok(ProgressClient::from_parts(ClientParts {
            client_id: self.client_id,
            target: self.target,
            policy: self.reconnect_policy,
            heartbeat_interval: self.heartbeat_interval,
            max_frame_bytes: self.max_frame_bytes,
            close_timeout: self.close_timeout,
            sink,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;
    use crate::sink::ChannelSink;

    fn sink() -> ChannelSink {
        ChannelSink::new().0
    }

    #[test]
    fn builds_with_defaults() {
        let client = ProgressClientBuilder::new("c-1", "wss://host/ws/c-1")
            .sink(sink())
            .build()
            .unwrap();
        assert_eq!(client.reconnect_policy(), &ReconnectPolicy::default());
    }

    #[test]
    fn rejects_empty_identity() {
        let err = ProgressClientBuilder::new("  ", "wss://host/ws/x")
            .sink(sink())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn rejects_non_websocket_target() {
        for target in ["", "http://host/ws/c-1", "host:8000"] {
            let res = ProgressClientBuilder::new("c-1", target).sink(sink()).build();
            assert!(matches!(res, Err(ClientError::Config(_))), "{target}");
        }
    }

    #[test]
    fn requires_a_sink() {
        let res = ProgressClientBuilder::new("c-1", "ws://host/ws/c-1").build();
        assert!(matches!(res, Err(ClientError::Config(ref m)) if m.contains("sink")));
    }

    #[test]
    fn config_overrides_policy() {
        let cfg = ClientConfig {
            reconnect: ReconnectConfig {
                base_delay_ms: 250,
                max_attempts: 2,
                max_delay_ms: Some(400),
            },
            ..Default::default()
        };
        let client = ProgressClientBuilder::new("c-1", "ws://host/ws/c-1")
            .config(&cfg)
            .sink(sink())
            .build()
            .unwrap();
        let policy = client.reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.max_delay, Some(Duration::from_millis(400)));
    }
}
