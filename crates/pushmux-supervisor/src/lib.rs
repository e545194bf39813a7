//! PushMux Connection Supervisor
//!
//! Keeps one long-lived push connection per active listener:
//! - At most one in-flight attempt and one pending retry per key
//! - Fixed-delay reconnection and periodic health reconciliation
//! - Liveness probing of connections that look open but are dead
//! - Observable `key -> status` snapshot and domain events
//! - Inbound messages handed to a pluggable dispatcher

pub mod consumers;
pub mod error;
pub mod pool;

pub use consumers::{
    spawn_dispatch_task, spawn_listener_feed, ChannelDispatcher, EventLogger, LoggingDispatcher,
    MessageDispatcher,
};
pub use error::{Result, SupervisorError};
pub use pool::{
    AttemptId, ConnectionHandle, ConnectionRecordView, ConnectionRegistry, ConnectionSupervisor,
    SupervisorBuilder, Transport, TransportEvent, TransportEventKind, TransportEventSender,
    WebSocketTransport,
};
