//! WebSocket transport over tokio-tungstenite
//!
//! One spawned task per attempt: connect, then pump outbound commands and
//! inbound frames until either side closes. The handle talks to the task
//! through an unbounded channel, so `send`/`probe` never block and report
//! false once the task has ended.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{ConnectionHandle, Transport, TransportEventSender};

/// Upper bound on the opening handshake
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug)]
enum Outbound {
    Data(Vec<u8>),
    Ping,
    Close { code: u16, reason: String },
}

/// Production transport: `ws://` and `wss://` (rustls, webpki roots)
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &str, events: TransportEventSender) -> Arc<dyn ConnectionHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_connection(
            url.to_string(),
            self.handshake_timeout,
            events,
            rx,
            cancel.clone(),
        ));

        Arc::new(WebSocketHandle { outbound: tx, cancel })
    }

    fn description(&self) -> String {
        format!(
            "websocket (handshake timeout {}s)",
            self.handshake_timeout.as_secs()
        )
    }
}

struct WebSocketHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

impl ConnectionHandle for WebSocketHandle {
    fn send(&self, payload: &[u8]) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let message = if payload.is_empty() {
            Outbound::Ping
        } else {
            Outbound::Data(payload.to_vec())
        };
        self.outbound.send(message).is_ok()
    }

    fn close(&self, code: u16, reason: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Queue the close frame first; the pump drains outbound before
        // noticing cancellation.
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.cancel.cancel();
    }
}

async fn run_connection(
    url: String,
    handshake_timeout: Duration,
    events: TransportEventSender,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
) {
    let key = events.key().clone();

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            trace!(key = %key, "[WebSocket] Attempt cancelled before open");
            return;
        }
        result = tokio::time::timeout(handshake_timeout, connect_async(url.as_str())) => result,
    };

    let stream = match connected {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            events.failed(e.to_string());
            return;
        }
        Err(_) => {
            events.failed(format!(
                "handshake timed out after {}s",
                handshake_timeout.as_secs()
            ));
            return;
        }
    };

    debug!(key = %key, url = %url, "[WebSocket] Open");
    events.opened();

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            command = outbound.recv() => {
                let message = match command {
                    Some(Outbound::Data(bytes)) => Message::Binary(bytes),
                    Some(Outbound::Ping) => Message::Ping(Vec::new()),
                    Some(Outbound::Close { code, reason }) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::Owned(reason),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        trace!(key = %key, code, "[WebSocket] Closed locally");
                        return;
                    }
                    // Handle dropped without an explicit close
                    None => {
                        let _ = write.close().await;
                        return;
                    }
                };
                if let Err(e) = write.send(message).await {
                    events.failed(e.to_string());
                    return;
                }
            }
            _ = cancel.cancelled() => {
                let _ = write.close().await;
                return;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.message(text);
                }
                Some(Ok(Message::Binary(bytes))) => {
                    events.message(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    events.closed(code, reason);
                    return;
                }
                // Ping/Pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.failed(e.to_string());
                    return;
                }
                None => {
                    events.closed(None, "stream ended");
                    return;
                }
            },
        }
    }
}
