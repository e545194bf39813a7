use thiserror::Error;

/// Configuration errors surfaced to the caller of a configuration change.
///
/// These never reach the supervisor worker: invalid input is rejected
/// before any connection attempt is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{0}' (expected ws, wss, http or https)")]
    UnsupportedScheme(String),

    #[error("connection key must not be empty")]
    EmptyKey,

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
