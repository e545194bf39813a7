//! Event Logger - Audit trail of supervisor events
//!
//! Subscribes to the event bus and writes each event to tracing. Periodic
//! snapshot republishes are logged at trace level only.

use pushmux_core::{DomainEvent, DomainEventEnvelope, EventReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

pub struct EventLogger {
    receiver: EventReceiver,
}

impl EventLogger {
    pub fn new(receiver: EventReceiver) -> Self {
        Self { receiver }
    }

    /// Run until the event bus closes or the supervisor stops
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("[EventLogger] Started");
            while let Some(event) = self.receiver.recv().await {
                let stopped = matches!(event, DomainEvent::SupervisorStopped);
                log_event(DomainEventEnvelope::new(event));
                if stopped {
                    break;
                }
            }
            debug!("[EventLogger] Stopped");
        })
    }
}

fn log_event(envelope: DomainEventEnvelope) {
    let event_id = envelope.event_id;
    match &envelope.event {
        DomainEvent::ConnectionStatusChanged {
            key,
            status,
            previous,
            attempt_count,
            message,
        } => {
            info!(
                %event_id,
                key = %key,
                status = %status,
                previous = ?previous,
                attempt_count,
                message = message.as_deref().unwrap_or(""),
                "[EventLogger] Status changed"
            );
        }
        DomainEvent::ConnectionSuspect {
            key,
            silent_for_secs,
        } => {
            warn!(%event_id, key = %key, silent_for_secs, "[EventLogger] Connection suspect");
        }
        event if event.is_periodic() => {
            trace!(%event_id, event_type = event.type_name(), "[EventLogger] Periodic event");
        }
        event => {
            let payload = serde_json::to_string(event).unwrap_or_default();
            debug!(
                %event_id,
                event_type = event.type_name(),
                payload = %payload,
                "[EventLogger] Event"
            );
        }
    }
}
