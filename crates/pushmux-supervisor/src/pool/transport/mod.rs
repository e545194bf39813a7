//! Transport abstraction for listener connections
//!
//! The supervisor never speaks the wire protocol. A [`Transport`] opens one
//! physical connection per attempt and returns a [`ConnectionHandle`]
//! immediately; everything that happens afterwards (open, message, close,
//! failure) is reported as a typed [`TransportEvent`] on a channel owned by
//! the supervisor worker. Events are tagged with the attempt that produced
//! them so results from superseded attempts can be discarded.

mod websocket;

use std::sync::Arc;

use pushmux_core::ConnectionKey;
use tokio::sync::mpsc;
use tracing::trace;

pub use websocket::WebSocketTransport;

/// Monotonic identifier of one connection attempt
pub type AttemptId = u64;

/// What happened on a physical connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Handshake completed
    Opened,
    /// Inbound application message
    Message(String),
    /// Peer or local side closed the connection
    Closed { code: Option<u16>, reason: String },
    /// Handshake failed or the connection broke
    Failed { error: String },
}

/// Transport event routed to the supervisor worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub key: ConnectionKey,
    pub attempt: AttemptId,
    pub kind: TransportEventKind,
}

/// Per-attempt event sink handed to [`Transport::open`]
///
/// Sending never blocks. Once the supervisor is gone, sends are dropped.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    key: ConnectionKey,
    attempt: AttemptId,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEventSender {
    pub(crate) fn new(
        key: ConnectionKey,
        attempt: AttemptId,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self { key, attempt, tx }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn opened(&self) -> bool {
        self.send(TransportEventKind::Opened)
    }

    pub fn message(&self, payload: impl Into<String>) -> bool {
        self.send(TransportEventKind::Message(payload.into()))
    }

    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) -> bool {
        self.send(TransportEventKind::Closed {
            code,
            reason: reason.into(),
        })
    }

    pub fn failed(&self, error: impl Into<String>) -> bool {
        self.send(TransportEventKind::Failed {
            error: error.into(),
        })
    }

    fn send(&self, kind: TransportEventKind) -> bool {
        let delivered = self
            .tx
            .send(TransportEvent {
                key: self.key.clone(),
                attempt: self.attempt,
                kind,
            })
            .is_ok();
        if !delivered {
            trace!(key = %self.key, attempt = self.attempt, "[Transport] Supervisor gone, event dropped");
        }
        delivered
    }
}

/// Handle to one physical connection (or in-flight attempt)
pub trait ConnectionHandle: Send + Sync {
    /// Queue bytes for sending. Returns false when the connection can no
    /// longer carry data.
    fn send(&self, payload: &[u8]) -> bool;

    /// Close the connection with the given close code. Idempotent.
    fn close(&self, code: u16, reason: &str);

    /// Liveness probe: a zero-length send
    fn probe(&self) -> bool {
        self.send(&[])
    }
}

/// Transport capability used by the supervisor
///
/// `open` must return without waiting for the handshake; implementations
/// spawn their IO and report progress through `events`.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: &str, events: TransportEventSender) -> Arc<dyn ConnectionHandle>;

    /// Get a description for logging
    fn description(&self) -> String;
}
