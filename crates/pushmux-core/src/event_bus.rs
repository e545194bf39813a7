//! Domain event bus
//!
//! The supervisor worker is the only producer. Observers subscribe with an
//! [`EventFilter`] so a per-listener badge or an audit log only wakes for the
//! events it renders.
//!
//! ```text
//!   worker ──emit──▶ broadcast ──▶ EventReceiver(All)        audit log, tests
//!                              ──▶ EventReceiver(Key("k1"))   one listener's badge
//!                              ──▶ EventReceiver(Lifecycle)   no snapshot republishes
//! ```
//!
//! A receiver that falls behind skips to the oldest retained event; the
//! status snapshot watch is the authoritative state, events are a log.

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::{ConnectionKey, DomainEvent};

const DEFAULT_CAPACITY: usize = 256;

/// Which events a receiver yields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    /// Events scoped to one connection key
    Key(ConnectionKey),
    /// Everything except periodic snapshot republishes
    Lifecycle,
}

impl EventFilter {
    pub fn key(key: impl Into<ConnectionKey>) -> Self {
        Self::Key(key.into())
    }

    pub fn matches(&self, event: &DomainEvent) -> bool {
        match self {
            Self::All => true,
            Self::Key(key) => event.key() == Some(key),
            Self::Lifecycle => !event.is_periodic(),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Every event emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.subscribe_filtered(EventFilter::All)
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            filter,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side, held by the supervisor worker and broadcaster
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventSender {
    /// Emit to current subscribers. Having none is normal.
    pub fn emit(&self, event: DomainEvent) {
        let type_name = event.type_name();
        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(event_type = type_name, receivers, "[EventBus] Emitted");
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    filter: EventFilter,
}

impl EventReceiver {
    /// Next matching event; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, filter = ?self.filter, "[EventBus] Receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, filter = ?self.filter, "[EventBus] Receiver lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
