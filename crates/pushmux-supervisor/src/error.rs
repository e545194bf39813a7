use pushmux_core::ConfigError;
use thiserror::Error;

/// Errors returned by [`ConnectionSupervisor`](crate::ConnectionSupervisor) operations.
///
/// Per-key connection failures are never surfaced here; they show up as
/// `Error` status in the snapshot and are retried by the worker.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connection supervisor is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
