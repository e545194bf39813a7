//! Status snapshot publication
//!
//! Observers either hold a `watch::Receiver<StatusSnapshot>` or listen for
//! `StatusSnapshotPublished` on the event bus. `publish` only notifies when
//! the projection changed; `republish` always does, on the periodic cadence.

use pushmux_core::{DomainEvent, EventSender, StatusSnapshot};
use tokio::sync::watch;
use tracing::trace;

pub(crate) struct StatusBroadcaster {
    tx: watch::Sender<StatusSnapshot>,
    events: EventSender,
}

impl StatusBroadcaster {
    pub(crate) fn new(events: EventSender) -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::new());
        Self { tx, events }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn current(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Publish if the snapshot differs from the last one. Returns true on change.
    pub(crate) fn publish(&self, snapshot: StatusSnapshot) -> bool {
        let mut next = Some(snapshot);
        let changed = self.tx.send_if_modified(|current| {
            let Some(snapshot) = next.take() else {
                return false;
            };
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        if changed {
            let counts = self.tx.borrow().counts();
            trace!(
                connected = counts.connected,
                connecting = counts.connecting,
                error = counts.error,
                disconnected = counts.disconnected,
                "[Broadcaster] Snapshot changed"
            );
            self.emit_current();
        }
        changed
    }

    /// Unconditional publish for the periodic cadence
    pub(crate) fn republish(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(snapshot);
        self.emit_current();
    }

    fn emit_current(&self) {
        let snapshot = self.current();
        self.events
            .emit(DomainEvent::StatusSnapshotPublished { snapshot });
    }
}
