use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconnect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reconnect tuning, as read from the `[client.reconnect]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Linear back-off unit in milliseconds.
    #[serde(default = "d_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Reconnects allowed between two successful opens.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    /// Optional ceiling on a single delay.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: d_base_delay_ms(),
            max_attempts: d_max_attempts(),
            max_delay_ms: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Send a ping every N seconds while open.  Disabled when unset.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
    /// Inbound frames larger than this are reported as malformed and the
    /// transport is re-established.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// How long `disconnect()` waits for the close frame to flush.
    #[serde(default = "d_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat_interval_secs: None,
            max_frame_bytes: d_max_frame_bytes(),
            close_timeout_ms: d_close_timeout_ms(),
        }
    }
}

impl ClientConfig {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_delay_ms() -> u64 {
    2000
}

fn d_max_attempts() -> u32 {
    5
}

fn d_max_frame_bytes() -> usize {
    4 * 1024 * 1024 // 4 MB
}

fn d_close_timeout_ms() -> u64 {
    1000
}
