//! Live stream-list broadcast over WebSocket
//!
//! Every upgraded `/ws` connection gets its own [`BroadcastSession`]: a push
//! task that owns the socket's write half and, once per tick, polls the RTMP
//! statistics and sends the result as one text frame. Sessions share nothing
//! but the read-only poller, so one slow or failing peer never touches
//! another.
//!
//! ```text
//!   Connecting ──upgrade ok──▶ Active ──peer close / read error──▶ Closed
//!                                 │
//!                                 └──write failure / shutdown────▶ Closed
//! ```

use std::fmt;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::ORIGIN, HeaderMap},
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::AppState;
use crate::error::GatewayError;
use crate::stats::StatsPoller;

/// Time between two pushes on one connection
pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of one broadcast session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended
    PeerClosed,
    /// Reading from the peer failed
    ReadError,
    /// Pushing an update failed
    WriteFailed,
    /// Cancelled from outside (server shutdown or the other half closing)
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ReadError => "read error",
            CloseReason::WriteFailed => "write failed",
            CloseReason::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Upgrade to a WebSocket that receives the stream list every second
///
/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, GatewayError> {
    let origin = headers.get(ORIGIN).map(|v| v.to_str().unwrap_or_default());
    if !state.config.cors.permits(origin) {
        return Err(GatewayError::OriginRejected(
            origin.unwrap_or_default().to_string(),
        ));
    }

    let poller = state.poller.clone();
    let shutdown = state.shutdown.clone();

    Ok(ws
        .on_failed_upgrade(|e: axum::Error| {
            tracing::warn!(error = %e, "WebSocket upgrade failed, no session created");
        })
        .on_upgrade(move |socket| async move {
            BroadcastSession::new(poller, &shutdown).run(socket).await;
        }))
}

/// One connection's poll-and-push loop
pub struct BroadcastSession {
    /// Session ID for log correlation
    pub id: Uuid,
    poller: StatsPoller,
    interval: Duration,
    cancel: CancellationToken,
    state: SessionState,
}

impl BroadcastSession {
    /// Create a session whose cancellation is scoped under `parent`
    pub fn new(poller: StatsPoller, parent: &CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            poller,
            interval: BROADCAST_INTERVAL,
            cancel: parent.child_token(),
            state: SessionState::Connecting,
        }
    }

    /// Override the push interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that ends this session when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the session until the peer goes away, a push fails, or the
    /// token is cancelled.
    pub async fn run(self, socket: WebSocket) {
        let (sink, stream) = socket.split();
        self.run_split(sink, stream).await;
    }

    /// [`run`](Self::run) over an already split connection.
    ///
    /// The push task takes sole ownership of `sink`; this task keeps reading
    /// `stream` so a disconnect is noticed even between ticks. Returns once
    /// both halves have stopped.
    pub async fn run_split<S, R>(mut self, sink: S, stream: R) -> CloseReason
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: fmt::Display,
        R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        self.state = SessionState::Active;
        tracing::info!(session_id = %self.id, "Broadcast session started");

        let pusher = tokio::spawn(push_loop(
            self.id,
            self.poller.clone(),
            self.interval,
            sink,
            self.cancel.clone(),
        ));

        let reader_reason = watch_peer(self.id, stream, &self.cancel).await;
        self.cancel.cancel();

        let reason = match pusher.await {
            Ok(CloseReason::WriteFailed) => CloseReason::WriteFailed,
            Ok(_) => reader_reason,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Broadcast push task panicked");
                reader_reason
            }
        };

        self.state = SessionState::Closed;
        tracing::info!(session_id = %self.id, reason = %reason, "Broadcast session closed");
        reason
    }
}

/// Read inbound frames until the peer leaves or the session is cancelled.
///
/// Inbound payloads carry no meaning and are discarded.
async fn watch_peer<R>(id: Uuid, mut stream: R, cancel: &CancellationToken) -> CloseReason
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return CloseReason::Cancelled,
            frame = stream.next() => match frame {
                None | Some(Ok(Message::Close(_))) => return CloseReason::PeerClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session_id = %id, error = %e, "WebSocket read failed");
                    return CloseReason::ReadError;
                }
            },
        }
    }
}

/// Outcome of a single tick
enum Tick {
    Pushed(usize),
    Skipped,
    WriteFailed,
}

async fn push_loop<S>(
    id: Uuid,
    poller: StatsPoller,
    period: Duration,
    mut sink: S,
    cancel: CancellationToken,
) -> CloseReason
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    // First push one period after activation; late ticks are dropped, not
    // queued.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break CloseReason::Cancelled,
            _ = ticker.tick() => {}
        }

        let tick = tokio::select! {
            _ = cancel.cancelled() => break CloseReason::Cancelled,
            tick = push_once(id, &poller, &mut sink) => tick,
        };

        match tick {
            Tick::Pushed(count) => {
                tracing::trace!(session_id = %id, streams = count, "Pushed stream list");
            }
            Tick::Skipped => {}
            Tick::WriteFailed => break CloseReason::WriteFailed,
        }
    };

    cancel.cancel();
    reason
}

async fn push_once<S>(id: Uuid, poller: &StatsPoller, sink: &mut S) -> Tick
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let streams = match poller.poll().await {
        Ok(streams) => streams,
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "Stats poll failed, skipping tick");
            return Tick::Skipped;
        }
    };

    let payload = match serde_json::to_string(&streams) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(session_id = %id, error = %e, "Failed to serialize stream list");
            return Tick::Skipped;
        }
    };

    match sink.send(Message::Text(payload)).await {
        Ok(()) => Tick::Pushed(streams.len()),
        Err(e) => {
            tracing::info!(session_id = %id, error = %e, "WebSocket write failed");
            Tick::WriteFailed
        }
    }
}
