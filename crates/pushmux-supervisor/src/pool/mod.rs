//! Connection pool - supervised listener connections
//!
//! - **ConnectionRegistry**: Per-key records (status, handle, retry state)
//! - **RetryScheduler**: Fixed-delay, cancellable reconnects
//! - **HealthMonitor**: Periodic reconciliation against the active key set
//! - **StatusBroadcaster**: `key -> status` snapshot publication
//! - **ConnectionSupervisor**: Public handle; commands run on a single worker
//! - **Transport**: Capability that opens physical connections

mod broadcaster;
mod health;
mod registry;
mod scheduler;
mod supervisor;
pub mod transport;
mod worker;

pub use registry::{ConnectionRecord, ConnectionRecordView, ConnectionRegistry};
pub use scheduler::PendingRetry;
pub use supervisor::{ConnectionSupervisor, SupervisorBuilder};
pub use transport::{
    AttemptId, ConnectionHandle, Transport, TransportEvent, TransportEventKind,
    TransportEventSender, WebSocketTransport,
};
