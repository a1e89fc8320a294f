//! Server-to-client event stream
//!
//! One worker task per open stream owns delivery for its session: it sends the
//! handshake, forwards queued messages in FIFO order, emits a keep-alive comment
//! after every idle interval, and destroys the session exactly once on exit.

use std::{sync::Arc, time::Duration};

use axum::response::sse::Event;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::mcp::{rpc::json_rpc_notification, server::initialize_result};
use crate::session::{SessionId, SessionStore};

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);
pub const KEEP_ALIVE_COMMENT: &str = "keep-alive";
const FRAME_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Message(Value),
    KeepAlive,
}

impl StreamFrame {
    pub fn into_event(self) -> Event {
        match self {
            Self::Message(payload) => Event::default().data(payload.to_string()),
            Self::KeepAlive => Event::default().comment(KEEP_ALIVE_COMMENT),
        }
    }
}

/// Liveness interval plus the process-wide shutdown switch observed by every worker.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub keep_alive: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl StreamSettings {
    pub fn new(keep_alive: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            keep_alive,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Ends every open stream.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP_ALIVE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientDisconnected,
    Shutdown,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::ClientDisconnected => "client_disconnected",
            Self::Shutdown => "shutdown",
        }
    }
}

pub fn handshake_message() -> Value {
    json_rpc_notification("notifications/initialized", initialize_result())
}

/// Opens a session and starts its delivery worker.
///
/// Dropping the returned receiver is the disconnect signal.
pub fn spawn_session_stream(
    sessions: Arc<SessionStore>,
    settings: StreamSettings,
) -> (SessionId, mpsc::Receiver<StreamFrame>) {
    let session_id = sessions.create();
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);

    info!(session_id = %session_id, "stream session opened");
    tokio::spawn(run_session(
        SessionGuard {
            sessions,
            session_id: session_id.clone(),
        },
        settings,
        tx,
    ));

    (session_id, rx)
}

struct SessionGuard {
    sessions: Arc<SessionStore>,
    session_id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.destroy(&self.session_id);
    }
}

async fn run_session(
    guard: SessionGuard,
    settings: StreamSettings,
    tx: mpsc::Sender<StreamFrame>,
) {
    let opened_at = guard.sessions.opened_at(&guard.session_id);
    let reason = deliver(&guard.sessions, &guard.session_id, &settings, &tx).await;
    let open_ms = opened_at
        .map(|opened_at| (Utc::now() - opened_at).num_milliseconds())
        .unwrap_or_default();
    info!(
        session_id = %guard.session_id,
        reason = reason.as_str(),
        open_ms,
        "stream session closed"
    );
}

/// Sends one frame unless the client is gone or shutdown begins first; a client
/// that stops reading must not hold the worker past shutdown.
async fn send_frame(
    tx: &mpsc::Sender<StreamFrame>,
    shutdown: &mut watch::Receiver<bool>,
    frame: StreamFrame,
) -> Result<(), CloseReason> {
    tokio::select! {
        sent = tx.send(frame) => sent.map_err(|_| CloseReason::ClientDisconnected),
        _ = shutdown.changed() => Err(CloseReason::Shutdown),
    }
}

async fn deliver(
    sessions: &SessionStore,
    session_id: &SessionId,
    settings: &StreamSettings,
    tx: &mpsc::Sender<StreamFrame>,
) -> CloseReason {
    let Some(wakeup) = sessions.wakeup(session_id) else {
        return CloseReason::Shutdown;
    };
    let mut shutdown = settings.shutdown.subscribe();

    let handshake = StreamFrame::Message(handshake_message());
    if let Err(reason) = send_frame(tx, &mut shutdown, handshake).await {
        return reason;
    }

    loop {
        if *shutdown.borrow_and_update() {
            return CloseReason::Shutdown;
        }

        let pending = sessions.drain_and_clear(session_id);
        if !pending.is_empty() {
            for message in pending {
                if let Err(reason) =
                    send_frame(tx, &mut shutdown, StreamFrame::Message(message)).await
                {
                    return reason;
                }
            }
            continue;
        }

        tokio::select! {
            _ = tx.closed() => return CloseReason::ClientDisconnected,
            _ = shutdown.changed() => return CloseReason::Shutdown,
            _ = wakeup.notified() => {}
            _ = tokio::time::sleep(settings.keep_alive) => {
                if let Err(reason) = send_frame(tx, &mut shutdown, StreamFrame::KeepAlive).await {
                    return reason;
                }
            }
        }
    }
}
