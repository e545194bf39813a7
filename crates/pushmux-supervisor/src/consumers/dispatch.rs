//! Inbound message dispatch
//!
//! The worker never awaits a consumer. It pushes every inbound message onto
//! an unbounded channel drained by a dedicated task, which hands each one
//! to a [`MessageDispatcher`] (storage, notification rendering, tests).

use std::sync::Arc;

use async_trait::async_trait;
use pushmux_core::InboundMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Receiver of inbound application messages
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn dispatch(&self, message: InboundMessage);
}

/// Forwards messages to an mpsc channel
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<InboundMessage>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self { tx }
    }

    /// Create a dispatcher together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl MessageDispatcher for ChannelDispatcher {
    async fn dispatch(&self, message: InboundMessage) {
        if self.tx.send(message).is_err() {
            debug!("[Dispatch] Message receiver dropped");
        }
    }
}

/// Logs each message; used when no consumer is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl MessageDispatcher for LoggingDispatcher {
    async fn dispatch(&self, message: InboundMessage) {
        info!(
            key = %message.key,
            bytes = message.payload.len(),
            received_at = %message.received_at,
            "[Dispatch] Message received"
        );
    }
}

/// Drain `rx` into `dispatcher` until the worker drops its sender.
pub fn spawn_dispatch_task(
    dispatcher: Arc<dyn MessageDispatcher>,
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            dispatcher.dispatch(message).await;
        }
        debug!("[Dispatch] Message channel closed");
    })
}
