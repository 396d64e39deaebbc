//! Core types: connection state and the errors surfaced to consumers.

use std::fmt;
use std::time::Duration;

/// Lifecycle of the single transport owned by a [`ProgressClient`](crate::ProgressClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// A caller-initiated close is in flight.
    Closing,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse class of a [`ProgressError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect failure, socket error, retries exhausted.
    Transport,
    /// A frame that cannot be interpreted.  Never retried.
    Protocol,
    /// Unknown status value.  Non-fatal; the frame was still forwarded.
    Semantic,
    /// The backend reported that the job itself failed.
    Job,
}

/// Everything delivered through [`ProgressSink::on_error`](crate::ProgressSink::on_error).
///
/// The variants keep "still reconnecting", "gave up" and "job failed" apart
/// so consumers never have to parse error strings.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProgressError {
    /// Advisory connectivity problem; a reconnect may follow.
    #[error("connection error: {0}")]
    Transport(String),

    /// Reconnect attempts are used up; the client stays disconnected.
    #[error("connection abandoned after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    /// The frame could not be parsed and was dropped.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// `status: completed` arrived without a nested result.
    #[error("completed frame carried no result")]
    MissingResult,

    /// A status outside the known vocabulary; the frame was forwarded as progress.
    #[error("unknown status forwarded: {0}")]
    UnknownStatus(String),

    /// `status: error` from the backend.
    #[error("{0}")]
    Job(String),
}

impl ProgressError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::ReconnectExhausted { .. } => ErrorKind::Transport,
            Self::Malformed(_) | Self::MissingResult => ErrorKind::Protocol,
            Self::UnknownStatus(_) => ErrorKind::Semantic,
            Self::Job(_) => ErrorKind::Job,
        }
    }

    /// Whether this error ends the run from the consumer's point of view.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Job(_) | Self::ReconnectExhausted { .. })
    }
}

/// Errors returned by the client's own API (construction, runtime).
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("config: {0}")]
    Config(String),
    #[error("connect() must be called from within a Tokio runtime")]
    NoRuntime,
}

/// Notification that a reconnect has been scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectScheduled {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(ProgressError::Transport("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(
            ProgressError::ReconnectExhausted { attempts: 5 }.kind(),
            ErrorKind::Transport
        );
        assert_eq!(ProgressError::Malformed("x".into()).kind(), ErrorKind::Protocol);
        assert_eq!(ProgressError::MissingResult.kind(), ErrorKind::Protocol);
        assert_eq!(ProgressError::UnknownStatus("x".into()).kind(), ErrorKind::Semantic);
        assert_eq!(ProgressError::Job("boom".into()).kind(), ErrorKind::Job);
    }

    #[test]
    fn only_job_failure_and_give_up_are_terminal() {
        assert!(ProgressError::Job("boom".into()).is_terminal());
        assert!(ProgressError::ReconnectExhausted { attempts: 5 }.is_terminal());
        assert!(!ProgressError::Transport("reset".into()).is_terminal());
        assert!(!ProgressError::MissingResult.is_terminal());
        assert!(!ProgressError::UnknownStatus("x".into()).is_terminal());
    }

    #[test]
    fn job_error_displays_backend_text_verbatim() {
        assert_eq!(ProgressError::Job("boom".into()).to_string(), "boom");
    }
}
