//! Progress protocol: WebSocket frame types exchanged between a job-progress
//! client and the generation backend.
//!
//! The backend pushes status frames (`{"status": "...", ...}`) and answers
//! client pings with keep-alive frames (`{"type": "pong"}`).  The client only
//! ever sends pings.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Close code that signals "no recovery needed".
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code used when the transport dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Text reported when an `error` frame carries no message.
pub const DEFAULT_JOB_ERROR: &str = "Unknown error occurred";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status vocabulary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Job status reported by the backend.
///
/// The vocabulary is open: values the client does not know deserialize into
/// [`JobStatus::Other`] instead of failing, and serialize back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Started,
    Analyzing,
    AnalyzingGit,
    Storing,
    StoringRag,
    CallingLlm,
    ParsingResponse,
    Generating,
    GeneratingExcel,
    Completed,
    Error,
    /// A status this client version does not recognise.
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => "started",
            Self::Analyzing => "analyzing",
            Self::AnalyzingGit => "analyzing_git",
            Self::Storing => "storing",
            Self::StoringRag => "storing_rag",
            Self::CallingLlm => "calling_llm",
            Self::ParsingResponse => "parsing_response",
            Self::Generating => "generating",
            Self::GeneratingExcel => "generating_excel",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }

    /// `false` only for [`JobStatus::Other`].
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// `completed` and `error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "started" => Self::Started,
            "analyzing" => Self::Analyzing,
            "analyzing_git" => Self::AnalyzingGit,
            "storing" => Self::Storing,
            "storing_rag" => Self::StoringRag,
            "calling_llm" => Self::CallingLlm,
            "parsing_response" => Self::ParsingResponse,
            "generating" => Self::Generating,
            "generating_excel" => Self::GeneratingExcel,
            "completed" => Self::Completed,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match Self::from(s.as_str()) {
            Self::Other(_) => Self::Other(s),
            known => known,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A status frame pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub status: JobStatus,
    /// Human-readable description of the current stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Percentage in `[0, 100]`.  Not guaranteed to be monotonic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Structured payload: the terminal `result` and/or ancillary metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ProgressMessage {
    pub fn new(status: impl Into<JobStatus>) -> Self {
        Self {
            status: status.into(),
            message: None,
            progress: None,
            details: None,
        }
    }

    /// The nested `details.result`, if present and not `null`.
    pub fn result(&self) -> Option<&Value> {
        self.details
            .as_ref()?
            .get("result")
            .filter(|v| !v.is_null())
    }
}

/// Any frame the backend may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// A status frame.
    Progress(ProgressMessage),
    /// `{"type": "pong"}` keep-alive; carries no job state.
    KeepAlive { timestamp: Option<f64> },
}

/// Why an inbound frame could not be classified.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has neither a status nor a keep-alive type{}", describe_type(.0))]
    Unrecognized(Option<String>),
}

fn describe_type(kind: &Option<String>) -> String {
    match kind {
        Some(k) => format!(" (type={k})"),
        None => String::new(),
    }
}

/// Parse and validate one inbound text frame.
///
/// The discriminator is checked explicitly: a non-null `status` makes a
/// status frame, otherwise `type: "pong"` makes a keep-alive.  Anything else
/// is rejected rather than guessed at.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(map) = &value else {
        return Err(FrameError::NotAnObject);
    };

    let has_status = map.get("status").is_some_and(|s| !s.is_null());
    if has_status {
        let msg: ProgressMessage = serde_json::from_value(value)?;
        return Ok(ServerFrame::Progress(msg));
    }

    match map.get("type").and_then(Value::as_str) {
        Some("pong") => Ok(ServerFrame::KeepAlive {
            timestamp: map.get("timestamp").and_then(Value::as_f64),
        }),
        other => Err(FrameError::Unrecognized(other.map(str::to_owned))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keep-alive probe; the backend answers with a pong.
    Ping { timestamp: i64 },
}

impl ClientFrame {
    /// A ping stamped with the current wall-clock time in milliseconds.
    pub fn ping_now() -> Self {
        Self::Ping {
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
