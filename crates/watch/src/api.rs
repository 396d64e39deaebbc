//! HTTP side of the generation backend: register a client id, start a
//! job, and read a status snapshot.

use jw_protocol::ProgressMessage;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ServerConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("a generation is already running for client {0}")]
    AlreadyRunning(String),

    #[error("client {0} not found")]
    NotFound(String),

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Response of `POST /api/v2/client`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    #[serde(default)]
    pub websocket_url: Option<String>,
    #[serde(default)]
    pub generate_url: Option<String>,
    #[serde(default)]
    pub status_url: Option<String>,
}

/// Body of `POST /api/v2/generate/{client_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub repo_path: String,
    pub use_performance_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateAccepted {
    #[serde(default)]
    pub message: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub websocket_url: Option<String>,
}

/// Response of `GET /api/v2/status/{client_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client_id: String,
    pub is_generating: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub websocket_connections: u32,
    #[serde(default)]
    pub progress: Option<ProgressMessage>,
    #[serde(default)]
    pub result: Option<Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct JobApi {
    http: Client,
    base_url: String,
}

impl JobApi {
    pub fn new(cfg: &ServerConfig) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(cfg.request_timeout()).build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Allocate a fresh client id on the backend.
    pub async fn register(&self) -> Result<ClientRegistration, ApiError> {
        let resp = self.http.post(self.url("/api/v2/client")).send().await?;
        let resp = check("POST /api/v2/client", resp).await?;
        let reg: ClientRegistration = resp.json().await?;
        tracing::debug!(client_id = %reg.client_id, "registered client");
        Ok(reg)
    }

    /// Start a generation job for `client_id`.  Progress is pushed to
    /// the client's WebSocket stream, not returned here.
    pub async fn generate(
        &self,
        client_id: &str,
        req: &GenerateRequest,
    ) -> Result<GenerateAccepted, ApiError> {
        let resp = self
            .http
            .post(self.url(&format!("/api/v2/generate/{client_id}")))
            .json(req)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(ApiError::AlreadyRunning(client_id.to_owned()));
        }
        let resp = check("POST /api/v2/generate", resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn status(&self, client_id: &str) -> Result<ClientStatus, ApiError> {
        let resp = self
            .http
            .get(self.url(&format!("/api/v2/status/{client_id}")))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(client_id.to_owned()));
        }
        let resp = check("GET /api/v2/status", resp).await?;
        Ok(resp.json().await?)
    }
}

async fn check(endpoint: &str, resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        endpoint: endpoint.to_owned(),
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_snapshot_parses_backend_shape() {
        let raw = json!({
            "client_id": "c-1",
            "is_generating": true,
            "created_at": "2026-01-01T00:00:00",
            "websocket_connections": 1,
            "progress": {"status": "calling_llm", "message": "asking", "progress": 70.0}
        });
        let status: ClientStatus = serde_json::from_value(raw).unwrap();
        assert!(status.is_generating);
        let progress = status.progress.unwrap();
        assert_eq!(progress.status.as_str(), "calling_llm");
        assert_eq!(progress.progress, Some(70.0));
        assert!(status.result.is_none());
    }

    #[test]
    fn generate_request_wire_shape() {
        let req = GenerateRequest {
            repo_path: "/srv/repo".into(),
            use_performance_mode: true,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({"repo_path": "/srv/repo", "use_performance_mode": true})
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = JobApi::new(&ServerConfig {
            base_url: "http://host:8000/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(api.url("/api/v2/client"), "http://host:8000/api/v2/client");
    }
}
