//! Consumer-facing callback surface.

use std::panic::{catch_unwind, AssertUnwindSafe};

use jw_protocol::ProgressMessage;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::types::{ProgressError, ReconnectScheduled};

/// Implement this trait to receive the outcome of a job run.
///
/// The client calls exactly one of `on_progress`, `on_error` or
/// `on_complete` per inbound frame (none for keep-alives; an unknown status
/// yields `on_progress` followed by an `on_error` warning).  Callbacks run on
/// the client's connection task and must not block.  A panicking callback is
/// caught and logged; it never affects the connection state.
///
/// # Example
///
/// ```rust,no_run
/// use jw_client::{ProgressError, ProgressMessage, ProgressSink};
///
/// struct Printer;
///
/// impl ProgressSink for Printer {
///     fn on_progress(&self, msg: ProgressMessage) {
///         println!("{} {:?}", msg.status, msg.progress);
///     }
///     fn on_error(&self, err: ProgressError) {
///         eprintln!("{err}");
///     }
///     fn on_complete(&self, result: serde_json::Value) {
///         println!("{result}");
///     }
/// }
/// ```
pub trait ProgressSink: Send + Sync + 'static {
    fn on_progress(&self, message: ProgressMessage);

    fn on_error(&self, error: ProgressError);

    /// Delivered at most once per run.
    fn on_complete(&self, result: Value);

    /// The transport just opened.  This is where the job-start side channel
    /// should be fired.
    fn on_open(&self, _client_id: &str) {}

    /// A reconnect timer was scheduled after an abnormal close.
    fn on_reconnecting(&self, _scheduled: ReconnectScheduled) {}
}

/// Invoke a sink callback behind a panic boundary.
pub(crate) fn guarded(client_id: &str, callback: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(client_id = %client_id, callback, "progress callback panicked");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Closure sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// A sink assembled from three closures.
pub struct CallbackSink {
    on_progress: Callback<ProgressMessage>,
    on_error: Callback<ProgressError>,
    on_complete: Callback<Value>,
}

impl CallbackSink {
    pub fn new(
        on_progress: impl Fn(ProgressMessage) + Send + Sync + 'static,
        on_error: impl Fn(ProgressError) + Send + Sync + 'static,
        on_complete: impl Fn(Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_progress: Box::new(on_progress),
            on_error: Box::new(on_error),
            on_complete: Box::new(on_complete),
        }
    }
}

impl ProgressSink for CallbackSink {
    fn on_progress(&self, message: ProgressMessage) {
        (self.on_progress)(message)
    }

    fn on_error(&self, error: ProgressError) {
        (self.on_error)(error)
    }

    fn on_complete(&self, result: Value) {
        (self.on_complete)(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every callback, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Open { client_id: String },
    Progress(ProgressMessage),
    Error(ProgressError),
    Complete(Value),
    Reconnecting(ReconnectScheduled),
}

/// Forwards callbacks into an unbounded channel for `async` consumers.
///
/// Unbounded so that a slow receiver can never make the client drop a
/// terminal event.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("progress receiver dropped; event discarded");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, message: ProgressMessage) {
        self.forward(ProgressEvent::Progress(message));
    }

    fn on_error(&self, error: ProgressError) {
        self.forward(ProgressEvent::Error(error));
    }

    fn on_complete(&self, result: Value) {
        self.forward(ProgressEvent::Complete(result));
    }

    fn on_open(&self, client_id: &str) {
        self.forward(ProgressEvent::Open {
            client_id: client_id.to_owned(),
        });
    }

    fn on_reconnecting(&self, scheduled: ReconnectScheduled) {
        self.forward(ProgressEvent::Reconnecting(scheduled));
    }
}
