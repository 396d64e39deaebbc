use std::time::Duration;

use jw_client::ClientConfig;
use serde::{Deserialize, Serialize};

/// Top-level `jobwatch.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP origin of the generation backend.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// WebSocket origin.  Derived from `base_url` when unset.
    #[serde(default)]
    pub ws_base_url: Option<String>,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            ws_base_url: None,
            request_timeout_ms: d_request_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// WebSocket origin without a trailing slash.
    pub fn ws_base(&self) -> String {
        let base = match &self.ws_base_url {
            Some(ws) => ws.clone(),
            None => {
                let http = self.base_url.as_str();
                if let Some(rest) = http.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = http.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    http.to_owned()
                }
            }
        };
        base.trim_end_matches('/').to_owned()
    }

    /// Full progress-stream URL for one client id.
    pub fn progress_url(&self, client_id: &str) -> String {
        format!("{}/api/v2/ws/progress/{client_id}", self.ws_base())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Repository analysed when `--repo-path` is not given.
    #[serde(default)]
    pub repo_path: Option<String>,
    #[serde(default = "d_true")]
    pub use_performance_mode: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            repo_path: None,
            use_performance_mode: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "d_filter")]
    pub filter: String,
    /// Emit JSON lines instead of the compact format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: d_filter(),
            json: false,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "http://localhost:8000".into()
}
fn d_request_timeout_ms() -> u64 {
    30_000
}
fn d_true() -> bool {
    true
}
fn d_filter() -> String {
    "info".into()
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load the configuration from the path in `JW_CONFIG` (or
/// `jobwatch.toml`).  A missing file yields the defaults.  Returns the
/// parsed config and the path that was used.
pub fn load_config() -> anyhow::Result<(WatchConfig, String)> {
    let config_path = std::env::var("JW_CONFIG").unwrap_or_else(|_| "jobwatch.toml".into());
    let config = load_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_from(path: &str) -> anyhow::Result<WatchConfig> {
    if !std::path::Path::new(path).exists() {
        return Ok(WatchConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}
