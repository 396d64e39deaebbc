//! The `watch` command: register, connect, trigger once, follow to the end.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use jw_client::{ChannelSink, ProgressClient, ProgressError, ProgressEvent, ProgressMessage};
use serde_json::Value;

use crate::api::{ApiError, ClientStatus, GenerateRequest, JobApi};
use crate::config::WatchConfig;

/// Slack on top of `close_timeout` when waiting for the close to finish.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub client_id: Option<String>,
    pub repo_path: Option<String>,
    /// Start a job on the first open.  `false` only follows the stream.
    pub trigger: bool,
    pub use_performance_mode: bool,
}

/// How a watch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { client_id: String, result: Value },
    Failed { client_id: String, message: String },
    GaveUp { client_id: String, attempts: u32 },
    Interrupted { client_id: String },
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Completed { .. } => 0,
            Outcome::Failed { .. } | Outcome::GaveUp { .. } => 1,
            Outcome::Interrupted { .. } => 130,
        }
    }
}

/// Follow one job until it completes, fails, the client gives up
/// reconnecting, or `shutdown` resolves.
pub async fn run_watch(
    cfg: &WatchConfig,
    opts: WatchOptions,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<Outcome> {
    let repo_path = opts.repo_path.or_else(|| cfg.job.repo_path.clone());
    if opts.trigger && repo_path.is_none() {
        anyhow::bail!("no repository given: pass --repo-path or set [job] repo_path");
    }

    let api = JobApi::new(&cfg.server)?;
    let client_id = match opts.client_id {
        Some(id) => id,
        None => api.register().await.context("registering client")?.client_id,
    };
    let target = cfg.server.progress_url(&client_id);
    tracing::info!(client_id = %client_id, target = %target, "watching job");

    let (sink, mut events) = ChannelSink::new();
    let client = ProgressClient::builder(client_id.clone(), target)
        .config(&cfg.client)
        .sink(sink)
        .build()?;
    client.connect()?;

    let mut pending_trigger = repo_path.filter(|_| opts.trigger).map(|repo_path| GenerateRequest {
        repo_path,
        use_performance_mode: opts.use_performance_mode,
    });

    tokio::pin!(shutdown);
    let outcome = loop {
        let event = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(client_id = %client_id, "interrupted");
                break Outcome::Interrupted { client_id: client_id.clone() };
            }
            ev = events.recv() => ev,
        };
        let Some(event) = event else {
            close(&client, cfg).await;
            anyhow::bail!("progress channel closed unexpectedly");
        };

        match event {
            ProgressEvent::Open { .. } => {
                // Trigger once, after the stream is attached, so no frame is missed.
                if let Some(req) = pending_trigger.take() {
                    let started = tokio::select! {
                        _ = &mut shutdown => {
                            tracing::info!(client_id = %client_id, "interrupted while starting job");
                            break Outcome::Interrupted { client_id: client_id.clone() };
                        }
                        r = api.generate(&client_id, &req) => r,
                    };
                    match started {
                        Ok(accepted) => tracing::info!(
                            client_id = %client_id,
                            repo_path = %req.repo_path,
                            message = accepted.message.as_deref().unwrap_or(""),
                            "job started"
                        ),
                        Err(ApiError::AlreadyRunning(_)) => tracing::warn!(
                            client_id = %client_id,
                            "job already running, attaching to it"
                        ),
                        Err(e) => {
                            close(&client, cfg).await;
                            return Err(anyhow::Error::new(e).context("starting job"));
                        }
                    }
                }
            }
            ProgressEvent::Progress(msg) => println!("{}", render_progress(&msg)),
            ProgressEvent::Reconnecting(s) => tracing::warn!(
                client_id = %client_id,
                attempt = s.attempt,
                max_attempts = s.max_attempts,
                delay_ms = s.delay.as_millis() as u64,
                "connection lost, reconnecting"
            ),
            ProgressEvent::Complete(result) => {
                break Outcome::Completed {
                    client_id: client_id.clone(),
                    result,
                };
            }
            ProgressEvent::Error(err) => match err {
                ProgressError::Job(message) => {
                    break Outcome::Failed {
                        client_id: client_id.clone(),
                        message,
                    };
                }
                ProgressError::MissingResult => {
                    break Outcome::Failed {
                        client_id: client_id.clone(),
                        message: ProgressError::MissingResult.to_string(),
                    };
                }
                ProgressError::ReconnectExhausted { attempts } => {
                    break Outcome::GaveUp {
                        client_id: client_id.clone(),
                        attempts,
                    };
                }
                other => {
                    tracing::warn!(client_id = %client_id, kind = ?other.kind(), "{other}")
                }
            },
        }
    };

    close(&client, cfg).await;
    Ok(outcome)
}

/// Disconnect and wait until the normal-closure frame has been sent.
async fn close(client: &ProgressClient, cfg: &WatchConfig) {
    client.disconnect();
    if !client.wait_closed(cfg.client.close_timeout() + CLOSE_GRACE).await {
        tracing::debug!(client_id = %client.client_id(), "close did not complete in time");
    }
}

// ── Rendering ───────────────────────────────────────────────────────

/// One progress line, e.g. `[ 40%] generating: writing sheet`.
pub fn render_progress(msg: &ProgressMessage) -> String {
    let pct = match msg.progress {
        Some(p) => format!("{p:>3.0}%"),
        None => "   -".to_owned(),
    };
    match msg.message.as_deref().filter(|m| !m.is_empty()) {
        Some(text) => format!("[{pct}] {}: {text}", msg.status),
        None => format!("[{pct}] {}", msg.status),
    }
}

pub fn render_status(status: &ClientStatus) -> String {
    let mut out = format!(
        "client {}: {}",
        status.client_id,
        if status.is_generating { "generating" } else { "idle" }
    );
    if let Some(created) = &status.created_at {
        out.push_str(&format!(", created {created}"));
    }
    out.push_str(&format!(", {} stream(s)", status.websocket_connections));
    if let Some(progress) = &status.progress {
        out.push_str(&format!("\n{}", render_progress(progress)));
    }
    if status.result.is_some() {
        out.push_str("\nresult available");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use jw_client::JobStatus;

    #[test]
    fn progress_line_formats() {
        let mut msg = ProgressMessage::new(JobStatus::Generating);
        msg.progress = Some(40.0);
        msg.message = Some("writing sheet".into());
        assert_eq!(render_progress(&msg), "[ 40%] generating: writing sheet");

        msg.progress = None;
        msg.message = Some(String::new());
        assert_eq!(render_progress(&msg), "[   -] generating");
    }

    #[test]
    fn unknown_status_renders_verbatim() {
        let mut msg = ProgressMessage::new(JobStatus::from("quantum"));
        msg.progress = Some(100.0);
        assert_eq!(render_progress(&msg), "[100%] quantum");
    }

    #[test]
    fn exit_codes() {
        let id = || "c".to_owned();
        assert_eq!(
            Outcome::Completed { client_id: id(), result: Value::Null }.exit_code(),
            0
        );
        assert_eq!(
            Outcome::Failed { client_id: id(), message: "x".into() }.exit_code(),
            1
        );
        assert_eq!(Outcome::GaveUp { client_id: id(), attempts: 5 }.exit_code(), 1);
        assert_eq!(Outcome::Interrupted { client_id: id() }.exit_code(), 130);
    }

    #[test]
    fn status_summary() {
        let status = ClientStatus {
            client_id: "c-1".into(),
            is_generating: false,
            created_at: Some("2026-01-01T00:00:00".into()),
            websocket_connections: 0,
            progress: None,
            result: Some(serde_json::json!({"ok": true})),
        };
        assert_eq!(
            render_status(&status),
            "client c-1: idle, created 2026-01-01T00:00:00, 0 stream(s)\nresult available"
        );
    }
}
