//! Persistent WebSocket link to the beacon monitor.
//!
//! The socket is owned by a single supervisor task; callers reach it
//! through a command channel and never touch the socket directly. The
//! supervisor drives the connection lifecycle:
//!
//! `Disconnected → Connecting → Identifying → Ready → (Closing|Errored)
//! → Backoff → Connecting …`
//!
//! Reconnect delays follow `min(base_delay * attempt, cap_delay)`. After
//! `max_attempts` consecutive failures the link gives up (fail-stop, not
//! fail-forever spin) and waits for an explicit `connect()`.
//!
//! Sends are at-most-once: `send` fails fast with [`NotConnected`]
//! unless the link is `Ready`, and nothing is ever queued for later
//! delivery.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use beaconproto::Envelope;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Link lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Initial state; no connection attempt made yet
    Disconnected = 0,
    /// Socket open in progress
    Connecting = 1,
    /// Socket open, identification frame being sent
    Identifying = 2,
    /// Envelopes may be sent
    Ready = 3,
    /// Remote peer closed the connection
    Closing = 4,
    /// Socket-level failure
    Errored = 5,
    /// Waiting out a reconnect delay
    Backoff = 6,
    /// Exceeded max attempts; waiting for an explicit connect()
    GaveUp = 7,
    /// Terminal; no further reconnects will be scheduled
    ShuttingDown = 8,
}

impl LinkState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Identifying,
            3 => Self::Ready,
            4 => Self::Closing,
            5 => Self::Errored,
            6 => Self::Backoff,
            7 => Self::GaveUp,
            _ => Self::ShuttingDown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Errored => "errored",
            Self::Backoff => "backoff",
            Self::GaveUp => "gave_up",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Send was refused because the link is not in the `Ready` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("monitor link is not ready (state: {state})")]
pub struct NotConnected {
    pub state: LinkState,
}

/// Broadcast to observers (the SSE adapter) on every state transition.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub from: LinkState,
    pub to: LinkState,
}

/// Link configuration, derived from `[monitor]` + `[identity]` config.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket endpoint, e.g. "ws://localhost:2200"
    pub endpoint: String,
    /// Client id announced in the identification frame
    pub client_id: String,
    /// Base reconnect delay; attempt N waits `base_delay * N`
    pub base_delay: Duration,
    /// Upper bound on any single reconnect delay
    pub cap_delay: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl LinkConfig {
    pub fn new(monitor: &beaconconf::MonitorConfig, client_id: &str) -> Self {
        Self {
            endpoint: monitor.endpoint.clone(),
            client_id: client_id.to_string(),
            base_delay: Duration::from_millis(monitor.base_delay_ms),
            cap_delay: Duration::from_millis(monitor.cap_delay_ms),
            max_attempts: monitor.max_attempts,
        }
    }
}

/// Reconnect delay for the given attempt number (1-based). The multiply
/// saturates to the cap so an extreme configured base cannot overflow.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    base.checked_mul(attempt).map_or(cap, |d| cap.min(d))
}

enum LinkCommand {
    Connect,
    Send {
        frame: String,
        done: oneshot::Sender<Result<(), NotConnected>>,
    },
    Shutdown,
}

/// How a connected session ended.
enum SessionEnd {
    Closed,
    Errored,
    Shutdown,
}

/// Handle to the monitor link. All socket I/O happens in the supervisor
/// task; this handle only reads atomics and sends commands.
pub struct MonitorLink {
    config: LinkConfig,
    state: AtomicU8,
    attempts: AtomicU32,
    shutting_down: AtomicBool,
    cmd_tx: mpsc::Sender<LinkCommand>,
    events: broadcast::Sender<LinkEvent>,
}

impl MonitorLink {
    /// Create the link and spawn its supervisor task. Does not connect;
    /// call [`connect`](Self::connect) to start the first attempt.
    pub fn new(config: LinkConfig) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (events, _) = broadcast::channel(64);

        let link = Arc::new(Self {
            config,
            state: AtomicU8::new(LinkState::Disconnected as u8),
            attempts: AtomicU32::new(0),
            shutting_down: AtomicBool::new(false),
            cmd_tx,
            events,
        });

        tokio::spawn(supervisor(Arc::clone(&link), cmd_rx));
        link
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// True only in the `Ready` state.
    pub fn is_ready(&self) -> bool {
        self.state() == LinkState::Ready
    }

    /// Backoff cycles scheduled since the last `Ready` transition.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Subscribe to state transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Request a connection attempt. Cancels a pending backoff timer if
    /// one is running; restarts a given-up link with a fresh attempt
    /// counter. No-op while connected or shutting down.
    pub async fn connect(&self) {
        let _ = self.cmd_tx.send(LinkCommand::Connect).await;
    }

    /// Send one envelope, best effort. Fails fast with [`NotConnected`]
    /// unless the link is `Ready`; the envelope is never queued.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), NotConnected> {
        let state = self.state();
        if state != LinkState::Ready {
            return Err(NotConnected { state });
        }

        let (done, rx) = oneshot::channel();
        self.cmd_tx
            .send(LinkCommand::Send {
                frame: envelope.to_frame(),
                done,
            })
            .await
            .map_err(|_| NotConnected {
                state: self.state(),
            })?;

        rx.await.map_err(|_| NotConnected {
            state: self.state(),
        })?
    }

    /// Idempotent. Stops all reconnect scheduling and closes the live
    /// socket if one exists.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cmd_tx.send(LinkCommand::Shutdown).await;
    }

    fn set_state(&self, to: LinkState) {
        let from = LinkState::from_u8(self.state.swap(to as u8, Ordering::Relaxed));
        if from != to {
            debug!(from = %from, to = %to, "link state change");
            let _ = self.events.send(LinkEvent { from, to });
        }
    }
}

/// Owns the socket. Runs until shutdown or until every handle is gone.
async fn supervisor(link: Arc<MonitorLink>, mut cmd_rx: mpsc::Receiver<LinkCommand>) {
    let mut want_connect = false;

    loop {
        if link.shutting_down.load(Ordering::SeqCst) {
            break;
        }

        if !want_connect {
            // Idle: Disconnected or GaveUp. Nothing happens until an
            // explicit connect request arrives.
            match cmd_rx.recv().await {
                Some(LinkCommand::Connect) => {
                    link.attempts.store(0, Ordering::Relaxed);
                    want_connect = true;
                }
                Some(LinkCommand::Send { done, .. }) => {
                    let _ = done.send(Err(NotConnected { state: link.state() }));
                }
                Some(LinkCommand::Shutdown) | None => break,
            }
            continue;
        }

        link.set_state(LinkState::Connecting);
        match connect_async(&link.config.endpoint).await {
            Ok((ws, _response)) => {
                info!(endpoint = %link.config.endpoint, "monitor socket open");
                match run_session(&link, ws, &mut cmd_rx).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Closed | SessionEnd::Errored => {}
                }
            }
            Err(e) => {
                warn!(endpoint = %link.config.endpoint, "monitor connect failed: {e}");
            }
        }

        if link.shutting_down.load(Ordering::SeqCst) {
            break;
        }

        // Schedule the next attempt, or give up.
        let attempt = link.attempts.load(Ordering::Relaxed) + 1;
        if attempt > link.config.max_attempts {
            error!(
                attempts = link.config.max_attempts,
                "giving up on monitor reconnect; an explicit connect() restarts the link"
            );
            link.set_state(LinkState::GaveUp);
            want_connect = false;
            continue;
        }
        link.attempts.store(attempt, Ordering::Relaxed);
        link.set_state(LinkState::Backoff);

        let delay = backoff_delay(link.config.base_delay, link.config.cap_delay, attempt);
        debug!(attempt, ?delay, "reconnect scheduled");

        // Single outstanding timer; a Connect command cancels it and
        // retries immediately instead of stacking a second chain.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(LinkCommand::Connect) => break,
                    Some(LinkCommand::Send { done, .. }) => {
                        let _ = done.send(Err(NotConnected { state: LinkState::Backoff }));
                    }
                    Some(LinkCommand::Shutdown) | None => {
                        link.set_state(LinkState::ShuttingDown);
                        return;
                    }
                },
            }
        }
    }

    link.set_state(LinkState::ShuttingDown);
    debug!("link supervisor exiting");
}

/// Drive one open connection: identify, then relay sends and log
/// inbound frames until the socket drops or shutdown is requested.
async fn run_session(
    link: &MonitorLink,
    ws: WsStream,
    cmd_rx: &mut mpsc::Receiver<LinkCommand>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    // The identification frame precedes everything else on this connection.
    link.set_state(LinkState::Identifying);
    let identify = Envelope::identify(&link.config.client_id).to_frame();
    if let Err(e) = sink.send(Message::Text(identify)).await {
        warn!("failed to send identification frame: {e}");
        link.set_state(LinkState::Errored);
        return SessionEnd::Errored;
    }

    link.attempts.store(0, Ordering::Relaxed);
    link.set_state(LinkState::Ready);
    info!(endpoint = %link.config.endpoint, "monitor link ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(LinkCommand::Send { frame, done }) => {
                    match sink.send(Message::Text(frame)).await {
                        Ok(()) => {
                            let _ = done.send(Ok(()));
                        }
                        Err(e) => {
                            warn!("send to monitor failed: {e}");
                            link.set_state(LinkState::Errored);
                            let _ = done.send(Err(NotConnected { state: LinkState::Errored }));
                            return SessionEnd::Errored;
                        }
                    }
                }
                Some(LinkCommand::Connect) => {
                    debug!("connect requested while connected; ignoring");
                }
                Some(LinkCommand::Shutdown) | None => {
                    link.set_state(LinkState::Closing);
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => log_inbound(&text),
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("monitor closed the connection");
                    link.set_state(LinkState::Closing);
                    return SessionEnd::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("monitor socket error: {e}");
                    link.set_state(LinkState::Errored);
                    return SessionEnd::Errored;
                }
            },
        }
    }
}

/// Inbound monitor frames carry no semantics for the relay; they are
/// parsed best-effort and logged. Malformed frames never propagate.
fn log_inbound(text: &str) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) => {
            let kind = v.get("type").and_then(|t| t.as_str()).unwrap_or("unknown");
            debug!(kind, "frame from monitor");
        }
        Err(e) => {
            error!("malformed frame from monitor, discarding: {e}");
        }
    }
}
