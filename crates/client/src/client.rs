//! Connection manager: owns the WebSocket to one job's progress stream, the
//! reconnect policy and the connection lifecycle.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jw_protocol::{ClientFrame, ABNORMAL_CLOSURE};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::interpreter::{interpret, Interpretation};
use crate::reconnect::{CloseDecision, ReconnectPolicy, ReconnectState};
use crate::sink::{guarded, ProgressSink};
use crate::types::{ClientError, ConnectionState, ProgressError, ReconnectScheduled};

/// Outbound frames queued ahead of the writer.
const OUTBOUND_CAPACITY: usize = 64;

/// Close code reported when the server's close frame carried no code.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code sent when an inbound frame exceeds `max_frame_bytes`.
const MESSAGE_TOO_BIG: u16 = 1009;

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A streaming progress client for one job-client identity.
///
/// Create via [`ProgressClientBuilder`](crate::builder::ProgressClientBuilder).
/// Handles are cheap to clone and all refer to the same connection; when the
/// last handle is dropped the connection task shuts down.
#[derive(Clone)]
pub struct ProgressClient {
    inner: Arc<Inner>,
    _shutdown: Arc<DropGuard>,
}

pub(crate) struct ClientParts {
    pub client_id: String,
    pub target: String,
    pub policy: ReconnectPolicy,
    pub heartbeat_interval: Option<Duration>,
    pub max_frame_bytes: usize,
    pub close_timeout: Duration,
    pub sink: Arc<dyn ProgressSink>,
}

struct Inner {
    client_id: String,
    target: String,
    policy: ReconnectPolicy,
    heartbeat_interval: Option<Duration>,
    max_frame_bytes: usize,
    close_timeout: Duration,
    sink: Arc<dyn ProgressSink>,
    /// Parent of every session token; cancelled when the last handle drops.
    shutdown: CancellationToken,
    shared: Mutex<Shared>,
}

/// Mutable per-instance state.  Only the manager writes it.
struct Shared {
    state: ConnectionState,
    reconnect: ReconnectState,
    /// Bumped by every `connect()` that starts a new session.
    session: u64,
    /// Token of the live session; `None` once torn down.
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::Sender<ClientFrame>>,
    /// Set once a terminal outcome has been delivered on the current
    /// transport.  Cleared on every open, where the consumer restarts the job.
    run_finished: bool,
}

impl Shared {
    fn is_live(&self, session: u64) -> bool {
        self.session == session && self.cancel.is_some()
    }
}

/// How one transport lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// `disconnect()` (or drop) cancelled the session.
    Cancelled,
    /// The transport closed with this code.
    Closed(u16),
}

impl ProgressClient {
    /// Start a new builder.
    pub fn builder(
        client_id: impl Into<String>,
        target: impl Into<String>,
    ) -> crate::builder::ProgressClientBuilder {
        crate::builder::ProgressClientBuilder::new(client_id, target)
    }

    pub(crate) fn from_parts(parts: ClientParts) -> Self {
        let shutdown = CancellationToken::new();
        let guard = shutdown.clone().drop_guard();
        let inner = Inner {
            client_id: parts.client_id,
            target: parts.target,
            policy: parts.policy,
            heartbeat_interval: parts.heartbeat_interval,
            max_frame_bytes: parts.max_frame_bytes,
            close_timeout: parts.close_timeout,
            sink: parts.sink,
            shutdown,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                reconnect: ReconnectState::default(),
                session: 0,
                cancel: None,
                outbound: None,
                run_finished: false,
            }),
        };
        Self {
            inner: Arc::new(inner),
            _shutdown: Arc::new(guard),
        }
    }

    /// Open the progress stream.
    ///
    /// Idempotent: does nothing while `Open` or `Connecting`.  Returns
    /// immediately; the outcome arrives through the sink.  A pending
    /// reconnect timer is superseded by an explicit call.
    pub fn connect(&self) -> Result<(), ClientError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let (session, cancel) = {
            let mut shared = self.inner.shared.lock();
            if matches!(
                shared.state,
                ConnectionState::Open | ConnectionState::Connecting
            ) {
                tracing::debug!(
                    client_id = %self.inner.client_id,
                    state = %shared.state,
                    "connect() ignored"
                );
                return Ok(());
            }
            if let Some(old) = shared.cancel.take() {
                old.cancel();
            }
            let cancel = self.inner.shutdown.child_token();
            shared.session += 1;
            shared.cancel = Some(cancel.clone());
            shared.state = ConnectionState::Connecting;
            (shared.session, cancel)
        };

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move { inner.run(session, cancel).await });
        Ok(())
    }

    /// Close the stream with a normal-closure code and stay down.
    ///
    /// Cancels any pending reconnect timer and discards the reconnect state.
    /// A later `connect()` starts a new run.
    pub fn disconnect(&self) {
        let mut shared = self.inner.shared.lock();
        shared.reconnect.reset();
        shared.run_finished = false;
        shared.outbound = None;

        let Some(cancel) = shared.cancel.take() else {
            shared.state = ConnectionState::Disconnected;
            return;
        };

        tracing::info!(client_id = %self.inner.client_id, state = %shared.state, "disconnecting");
        cancel.cancel();
        shared.state = match shared.state {
            ConnectionState::Open => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        };
    }

    /// Queue a keep-alive ping.  No-op unless connected; failures are logged.
    pub fn send_ping(&self) {
        let shared = self.inner.shared.lock();
        if shared.state != ConnectionState::Open {
            return;
        }
        if let Some(tx) = &shared.outbound {
            if let Err(e) = tx.try_send(ClientFrame::ping_now()) {
                tracing::warn!(client_id = %self.inner.client_id, error = %e, "failed to queue ping");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Reconnects made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect.attempts()
    }

    pub fn reconnect_policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }

    /// Wait for a `disconnect()` to finish flushing its close frame.
    /// Returns `false` if the client is still not `Disconnected` after `limit`.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.state() == ConnectionState::Disconnected {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
        }
    }
}

impl Inner {
    /// Session driver: connect, read until close, then reconnect or stop.
    async fn run(self: Arc<Self>, session: u64, cancel: CancellationToken) {
        loop {
            let code = match self.connect_and_run(session, &cancel).await {
                SessionEnd::Cancelled => {
                    self.finish_close(session);
                    return;
                }
                SessionEnd::Closed(code) => code,
            };

            let decision = {
                let mut shared = self.shared.lock();
                if !shared.is_live(session) {
                    // Torn down between the close and this point.
                    if shared.session == session && shared.state == ConnectionState::Closing {
                        shared.state = ConnectionState::Disconnected;
                    }
                    return;
                }
                let caller_closing = shared.state == ConnectionState::Closing;
                shared.outbound = None;
                shared.state = ConnectionState::Disconnected;
                let decision = shared.reconnect.on_close(code, caller_closing, &self.policy);
                if !matches!(decision, CloseDecision::Retry { .. }) {
                    shared.cancel = None;
                }
                decision
            };

            match decision {
                CloseDecision::Stop => {
                    tracing::info!(client_id = %self.client_id, code, "progress stream closed");
                    return;
                }
                CloseDecision::GiveUp { attempts } => {
                    tracing::error!(
                        client_id = %self.client_id,
                        attempts,
                        "max reconnect attempts exhausted"
                    );
                    self.report(ProgressError::ReconnectExhausted { attempts });
                    return;
                }
                CloseDecision::Retry { attempt, delay } => {
                    tracing::info!(
                        client_id = %self.client_id,
                        code,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "reconnecting"
                    );
                    let scheduled = ReconnectScheduled {
                        attempt,
                        max_attempts: self.policy.max_attempts,
                        delay,
                    };
                    guarded(&self.client_id, "on_reconnecting", || {
                        self.sink.on_reconnecting(scheduled)
                    });

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::debug!(client_id = %self.client_id, "pending reconnect cancelled");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    if !self.begin_attempt(session) {
                        return;
                    }
                }
            }
        }
    }

    /// Single transport lifetime: connect, then pump frames until close.
    async fn connect_and_run(&self, session: u64, cancel: &CancellationToken) -> SessionEnd {
        tracing::info!(client_id = %self.client_id, target = %self.target, "connecting to progress stream");

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_frame_bytes);
        ws_config.max_frame_size = Some(self.max_frame_bytes);

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            r = tokio_tungstenite::connect_async_with_config(
                self.target.as_str(),
                Some(ws_config),
                false,
            ) => r,
        };
        let ws = match connected {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "connect failed");
                self.report(ProgressError::Transport(format!(
                    "failed to connect to {}: {e}",
                    self.target
                )));
                return SessionEnd::Closed(ABNORMAL_CLOSURE);
            }
        };

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientFrame>(OUTBOUND_CAPACITY);
        if !self.mark_open(session, outbound_tx.clone()) {
            return SessionEnd::Cancelled;
        }
        tracing::info!(client_id = %self.client_id, "progress stream open");
        guarded(&self.client_id, "on_open", || self.sink.on_open(&self.client_id));

        // Heartbeat task: periodic pings through the outbound queue.
        let heartbeat = self.heartbeat_interval.map(|period| {
            let tx = outbound_tx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    if tx.send(ClientFrame::ping_now()).await.is_err() {
                        break;
                    }
                }
            })
        });
        drop(outbound_tx);

        let (mut sink, mut stream) = ws.split();
        let end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    }));
                    match tokio::time::timeout(self.close_timeout, sink.send(close)).await {
                        Ok(Ok(())) => tracing::debug!(client_id = %self.client_id, "close frame sent"),
                        Ok(Err(e)) => tracing::debug!(client_id = %self.client_id, error = %e, "close frame not delivered"),
                        Err(_) => tracing::debug!(client_id = %self.client_id, "timed out sending close frame"),
                    }
                    break SessionEnd::Cancelled;
                }
                Some(frame) = outbound_rx.recv() => {
                    match serde_json::to_string(&frame) {
                        Ok(json) => {
                            if let Err(e) = sink.send(Message::Text(json)).await {
                                tracing::warn!(client_id = %self.client_id, error = %e, "failed to send frame");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to serialize outbound frame");
                        }
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!(client_id = %self.client_id, "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame
                            .as_ref()
                            .map(|f| u16::from(f.code))
                            .unwrap_or(NO_STATUS_RECEIVED);
                        tracing::info!(client_id = %self.client_id, code, ?frame, "server closed progress stream");
                        // Flush the close reply tungstenite queued.
                        match tokio::time::timeout(self.close_timeout, sink.close()).await {
                            Ok(Ok(())) | Ok(Err(WsError::ConnectionClosed)) => {}
                            Ok(Err(e)) => tracing::debug!(client_id = %self.client_id, error = %e, "close reply not delivered"),
                            Err(_) => tracing::debug!(client_id = %self.client_id, "timed out sending close reply"),
                        }
                        break SessionEnd::Closed(code);
                    }
                    // Ping/Pong control frames are handled by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(WsError::Capacity(e))) => {
                        tracing::warn!(
                            client_id = %self.client_id,
                            max = self.max_frame_bytes,
                            error = %e,
                            "inbound frame exceeds max_frame_bytes"
                        );
                        self.report(ProgressError::Malformed(format!(
                            "frame exceeds the {} byte limit: {e}",
                            self.max_frame_bytes
                        )));
                        // The reader cannot resync past an oversized frame.
                        let close = Message::Close(Some(CloseFrame {
                            code: CloseCode::Size,
                            reason: "frame too large".into(),
                        }));
                        let _ = tokio::time::timeout(self.close_timeout, sink.send(close)).await;
                        break SessionEnd::Closed(MESSAGE_TOO_BIG);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(client_id = %self.client_id, error = %e, "progress stream error");
                        self.report(ProgressError::Transport(e.to_string()));
                        break SessionEnd::Closed(ABNORMAL_CLOSURE);
                    }
                    None => {
                        tracing::info!(client_id = %self.client_id, "progress stream ended without close frame");
                        break SessionEnd::Closed(ABNORMAL_CLOSURE);
                    }
                },
            }
        };

        if let Some(task) = heartbeat {
            task.abort();
        }
        end
    }

    /// Interpret one text frame and notify the sink.  Oversized frames never
    /// get here; tungstenite rejects them at read time.
    fn handle_text(&self, text: &str) {
        let interpretation = interpret(text);

        if matches!(interpretation, Interpretation::KeepAlive) {
            tracing::trace!(client_id = %self.client_id, "received pong");
            return;
        }

        {
            let mut shared = self.shared.lock();
            if shared.run_finished {
                tracing::debug!(client_id = %self.client_id, "dropping frame received after terminal outcome");
                return;
            }
            if interpretation.is_terminal() {
                shared.run_finished = true;
            }
        }

        interpretation.dispatch(&self.client_id, self.sink.as_ref());
    }

    fn report(&self, error: ProgressError) {
        guarded(&self.client_id, "on_error", || self.sink.on_error(error));
    }

    /// Transport opened.  Returns `false` when the session was torn down
    /// while the handshake was in flight.
    fn mark_open(&self, session: u64, outbound: mpsc::Sender<ClientFrame>) -> bool {
        let mut shared = self.shared.lock();
        if !shared.is_live(session) {
            return false;
        }
        shared.state = ConnectionState::Open;
        shared.reconnect.reset();
        shared.run_finished = false;
        shared.outbound = Some(outbound);
        true
    }

    /// Reconnect timer fired; re-enter the connect path if still wanted.
    fn begin_attempt(&self, session: u64) -> bool {
        let mut shared = self.shared.lock();
        if !shared.is_live(session) {
            return false;
        }
        shared.state = ConnectionState::Connecting;
        true
    }

    /// The caller-initiated close has completed.
    fn finish_close(&self, session: u64) {
        let mut shared = self.shared.lock();
        if shared.session == session && shared.state == ConnectionState::Closing {
            shared.state = ConnectionState::Disconnected;
        }
        tracing::info!(client_id = %self.client_id, "progress stream closed by client");
    }
}
