//! Consumers - Collaborators around the supervisor
//!
//! - **MessageDispatcher**: Receives inbound messages forwarded by the worker
//! - **ListenerFeed**: Turns listener collection changes into `update_active_keys`
//! - **EventLogger**: Subscribes to DomainEvents and writes an audit trail to tracing
//!
//! # Architecture
//!
//! ```text
//!   persistence layer ──watch──▶ ListenerFeed ──▶ ConnectionSupervisor
//!                                                   │            │
//!                                        InboundMessage      DomainEvent
//!                                                   ▼            ▼
//!                                       MessageDispatcher   EventLogger / UI
//! ```

mod dispatch;
mod event_logger;
mod listener_feed;

pub use dispatch::{spawn_dispatch_task, ChannelDispatcher, LoggingDispatcher, MessageDispatcher};
pub use event_logger::EventLogger;
pub use listener_feed::spawn_listener_feed;
