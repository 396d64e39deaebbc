//! Progress interpreter: classifies one inbound frame and decides which
//! callback it produces.
//!
//! [`interpret`] is a pure function of the frame text.  It keeps no state,
//! buffers nothing and never reorders; the connection task calls it once per
//! frame in arrival order and hands the result to [`Interpretation::dispatch`].

use jw_protocol::{parse_server_frame, JobStatus, ProgressMessage, ServerFrame, DEFAULT_JOB_ERROR};
use serde_json::Value;

use crate::sink::{guarded, ProgressSink};
use crate::types::ProgressError;

/// The classification of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// `{"type":"pong"}`; produces no callback.
    KeepAlive,
    /// A known, non-terminal status.
    Progress(ProgressMessage),
    /// A status outside the known vocabulary: forwarded as progress, then
    /// reported as a soft warning.
    UnknownStatus(ProgressMessage),
    /// `completed` with a nested result.
    Complete(Value),
    /// Malformed frame, `completed` without a result, or `error` status.
    Failed(ProgressError),
}

impl Interpretation {
    /// Whether this frame ends the run (success or job failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(ProgressError::Job(_)))
    }

    /// Invoke the sink callback(s) for this frame.
    pub fn dispatch(self, client_id: &str, sink: &dyn ProgressSink) {
        match self {
            Self::KeepAlive => {}
            Self::Progress(msg) => guarded(client_id, "on_progress", || sink.on_progress(msg)),
            Self::UnknownStatus(msg) => {
                let warning = ProgressError::UnknownStatus(msg.status.to_string());
                guarded(client_id, "on_progress", || sink.on_progress(msg));
                guarded(client_id, "on_error", || sink.on_error(warning));
            }
            Self::Complete(result) => guarded(client_id, "on_complete", || sink.on_complete(result)),
            Self::Failed(err) => guarded(client_id, "on_error", || sink.on_error(err)),
        }
    }
}

/// Classify one raw text frame.
pub fn interpret(frame: &str) -> Interpretation {
    let msg = match parse_server_frame(frame) {
        Ok(ServerFrame::KeepAlive { .. }) => return Interpretation::KeepAlive,
        Ok(ServerFrame::Progress(msg)) => msg,
        Err(e) => return Interpretation::Failed(ProgressError::Malformed(e.to_string())),
    };

    match msg.status {
        JobStatus::Completed => match msg.details {
            Some(Value::Object(mut details)) => match details.remove("result") {
                Some(result) if !result.is_null() => Interpretation::Complete(result),
                _ => Interpretation::Failed(ProgressError::MissingResult),
            },
            _ => Interpretation::Failed(ProgressError::MissingResult),
        },
        JobStatus::Error => Interpretation::Failed(ProgressError::Job(
            msg.message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_JOB_ERROR.to_owned()),
        )),
        JobStatus::Other(_) => Interpretation::UnknownStatus(msg),
        _ => Interpretation::Progress(msg),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProgressSink for Recorder {
        fn on_progress(&self, message: ProgressMessage) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("progress:{}:{:?}", message.status, message.progress));
        }
        fn on_error(&self, error: ProgressError) {
            self.calls.lock().unwrap().push(format!("error:{error}"));
        }
        fn on_complete(&self, result: Value) {
            self.calls.lock().unwrap().push(format!("complete:{result}"));
        }
    }

    fn run(frames: &[&str]) -> Vec<String> {
        let sink = Recorder::default();
        for f in frames {
            interpret(f).dispatch("c-1", &sink);
        }
        sink.calls()
    }

    #[test]
    fn happy_path_sequence() {
        let calls = run(&[
            r#"{"status":"started","progress":0}"#,
            r#"{"status":"generating","progress":40}"#,
            r#"{"status":"completed","details":{"result":{"ok":true}}}"#,
        ]);
        assert_eq!(
            calls,
            vec![
                "progress:started:Some(0.0)",
                "progress:generating:Some(40.0)",
                r#"complete:{"ok":true}"#,
            ]
        );
    }

    #[test]
    fn completed_with_result_fires_only_on_complete() {
        let interp = interpret(r#"{"status":"completed","progress":100,"details":{"result":[1,2]}}"#);
        assert_eq!(interp, Interpretation::Complete(json!([1, 2])));
        assert!(interp.is_terminal());
        assert_eq!(
            run(&[r#"{"status":"completed","details":{"result":[1,2]}}"#]),
            vec!["complete:[1,2]"]
        );
    }

    #[test]
    fn completed_without_result_is_a_protocol_error() {
        for frame in [
            r#"{"status":"completed"}"#,
            r#"{"status":"completed","details":{}}"#,
            r#"{"status":"completed","details":{"result":null}}"#,
            r#"{"status":"completed","details":"done"}"#,
        ] {
            let interp = interpret(frame);
            assert_eq!(interp, Interpretation::Failed(ProgressError::MissingResult), "{frame}");
            assert!(!interp.is_terminal());
        }
    }

    #[test]
    fn error_status_uses_message_or_default() {
        assert_eq!(
            interpret(r#"{"status":"error","message":"boom"}"#),
            Interpretation::Failed(ProgressError::Job("boom".into()))
        );
        assert_eq!(
            interpret(r#"{"status":"error"}"#),
            Interpretation::Failed(ProgressError::Job(DEFAULT_JOB_ERROR.into()))
        );
        assert_eq!(
            interpret(r#"{"status":"error","message":""}"#),
            Interpretation::Failed(ProgressError::Job(DEFAULT_JOB_ERROR.into()))
        );
        assert!(interpret(r#"{"status":"error"}"#).is_terminal());
    }

    #[test]
    fn unknown_status_is_forwarded_then_warned() {
        let frame = r#"{"status":"reticulating","message":"splines","progress":12.5,"details":{"n":3}}"#;
        match interpret(frame) {
            Interpretation::UnknownStatus(msg) => {
                assert_eq!(msg.status, JobStatus::Other("reticulating".into()));
                assert_eq!(msg.message.as_deref(), Some("splines"));
                assert_eq!(msg.progress, Some(12.5));
                assert_eq!(msg.details, Some(json!({"n": 3})));
            }
            other => panic!("expected UnknownStatus, got {other:?}"),
        }
        assert_eq!(
            run(&[frame]),
            vec![
                "progress:reticulating:Some(12.5)",
                "error:unknown status forwarded: reticulating",
            ]
        );
    }

    #[test]
    fn keep_alive_produces_nothing() {
        assert_eq!(interpret(r#"{"type":"pong"}"#), Interpretation::KeepAlive);
        assert!(run(&[r#"{"type":"pong","timestamp":1.0}"#]).is_empty());
    }

    #[test]
    fn malformed_frames_report_parse_failure() {
        let calls = run(&["{not json", r#"{"type":"mystery"}"#, "42"]);
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.starts_with("error:malformed frame")));
    }

    #[test]
    fn progress_passes_fields_through_verbatim() {
        let frame = r#"{"status":"storing_rag","message":"indexing","progress":35.5,"details":{"chunks":120}}"#;
        let Interpretation::Progress(msg) = interpret(frame) else {
            panic!("expected Progress");
        };
        assert_eq!(msg.status, JobStatus::StoringRag);
        assert_eq!(msg.message.as_deref(), Some("indexing"));
        assert_eq!(msg.progress, Some(35.5));
        assert_eq!(msg.details, Some(json!({"chunks": 120})));
    }

    #[test]
    fn non_monotonic_progress_is_not_rejected() {
        let calls = run(&[
            r#"{"status":"generating","progress":60}"#,
            r#"{"status":"generating","progress":20}"#,
        ]);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn panicking_sink_does_not_stop_dispatch() {
        struct Exploding;
        impl ProgressSink for Exploding {
            fn on_progress(&self, _: ProgressMessage) {
                panic!("bad consumer");
            }
            fn on_error(&self, _: ProgressError) {}
            fn on_complete(&self, _: Value) {}
        }
        interpret(r#"{"status":"started"}"#).dispatch("c-1", &Exploding);
        interpret(r#"{"status":"mystery"}"#).dispatch("c-1", &Exploding);
    }
}
