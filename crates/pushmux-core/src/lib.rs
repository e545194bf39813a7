//! # PushMux Core Library
//!
//! Domain types, events, and configuration shared by the connection
//! supervisor and its collaborators.
//!
//! ## Modules
//!
//! - `domain` - Value objects (ConnectionKey, ConnectionStatus, StatusSnapshot) and events
//! - `endpoint` - Base URL validation and per-listener endpoint derivation
//! - `config` - Supervisor tunables
//! - `error` - Configuration errors
//! - `event_bus` - Central event distribution system

pub mod config;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod event_bus;

pub use config::SupervisorConfig;
pub use domain::*;
pub use endpoint::{fallback_url, parse_endpoint, BaseUrl};
pub use error::{ConfigError, ConfigResult};

// Event-driven architecture exports
pub use event_bus::{EventBus, EventFilter, EventReceiver, EventSender};
