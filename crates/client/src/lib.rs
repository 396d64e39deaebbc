//! `jw-client`: streaming job-progress client.
//!
//! Opens a WebSocket to the progress stream of one background generation
//! job, interprets the status frames the backend pushes, and reports the
//! outcome through a [`ProgressSink`].  Unexpected connection loss is
//! recovered transparently with linear back-off.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Consumer (CLI / UI)                                      │
//! │                                                           │
//! │   let (sink, mut events) = ChannelSink::new();            │
//! │   let client = ProgressClient::builder(id, ws_url)        │
//! │       .sink(sink)                                         │
//! │       .build()?;                                          │
//! │   client.connect()?;                                      │
//! │   while let Some(ev) = events.recv().await { ... }        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. `connect()` spawns the connection task and returns immediately
//! 2. On open: reconnect counter reset, `on_open` fires (trigger the job here)
//! 3. Each text frame is classified by the [`interpreter`]:
//!    - known status → `on_progress`
//!    - unknown status → `on_progress` + `on_error(UnknownStatus)`
//!    - `completed` with result → `on_complete` (once per run)
//!    - `completed` without result, `error`, malformed → `on_error`
//!    - `{"type":"pong"}` → nothing
//! 4. On close with code 1000 or after `disconnect()`: stay down
//! 5. On any other close: reconnect after `base_delay × attempt`, up to
//!    `max_attempts`, then `on_error(ReconnectExhausted)`

pub mod builder;
pub mod client;
pub mod config;
pub mod interpreter;
pub mod reconnect;
pub mod sink;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ProgressClientBuilder;
pub use client::ProgressClient;
pub use config::{ClientConfig, ReconnectConfig};
pub use reconnect::{CloseDecision, ReconnectPolicy, ReconnectState};
pub use sink::{CallbackSink, ChannelSink, ProgressEvent, ProgressSink};
pub use types::{ClientError, ConnectionState, ErrorKind, ProgressError, ReconnectScheduled};

// Re-export protocol types so consumers never need to import jw-protocol directly.
pub use jw_protocol::{JobStatus, ProgressMessage, NORMAL_CLOSURE};
