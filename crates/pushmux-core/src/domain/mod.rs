//! Domain value objects and events
//!
//! - Value Objects (ConnectionKey, ConnectionStatus, StatusSnapshot)
//! - Collaborator payloads (ListenerEntry, InboundMessage)
//! - Domain Events (DomainEvent enum for event-driven architecture)

mod connection;
mod event;
mod listener;
mod message;

pub use connection::{ConnectionKey, ConnectionStatus, StatusCounts, StatusSnapshot};
pub use event::{DomainEvent, DomainEventEnvelope};
pub use listener::{active_keys, ListenerEntry};
pub use message::InboundMessage;
