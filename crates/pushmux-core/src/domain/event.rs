//! Domain Events - Unified event system for PushMux
//!
//! Every observable change in the supervisor is represented as an event in
//! this module. Events are emitted by the supervisor worker and consumed by:
//! - UI bridges (status badges, "retry all" feedback)
//! - Diagnostics / audit logging
//!
//! # Design Principles
//!
//! - **Single Source of Truth**: One enum for all domain events
//! - **Immutable**: Events are facts that happened, never mutated
//! - **Serializable**: All events can be serialized for transport/storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConnectionKey, ConnectionStatus, StatusSnapshot};

// ============================================================================
// DOMAIN EVENT ENUM
// ============================================================================

/// Unified domain events emitted by the connection supervisor
///
/// # Serialization
///
/// Events serialize with a `type` field containing the snake_case variant name:
/// ```json
/// { "type": "connection_status_changed", "key": "...", "status": "connected", ... }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ════════════════════════════════════════════════════════════════════════
    // CONNECTION LIFECYCLE
    // ════════════════════════════════════════════════════════════════════════
    /// A connection record changed status
    ConnectionStatusChanged {
        key: ConnectionKey,
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<ConnectionStatus>,
        attempt_count: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A connection record was torn down and removed from the registry
    ConnectionRemoved { key: ConnectionKey },

    /// A fixed-delay reconnect was scheduled
    RetryScheduled {
        key: ConnectionKey,
        attempt_count: u32,
        delay_ms: u64,
    },

    /// A connected key has been silent for longer than the suspect threshold
    ConnectionSuspect {
        key: ConnectionKey,
        silent_for_secs: u64,
    },

    // ════════════════════════════════════════════════════════════════════════
    // SNAPSHOT
    // ════════════════════════════════════════════════════════════════════════
    /// Full status snapshot, published on every change and periodically
    StatusSnapshotPublished { snapshot: StatusSnapshot },

    // ════════════════════════════════════════════════════════════════════════
    // SUPERVISOR
    // ════════════════════════════════════════════════════════════════════════
    /// Base server URL changed; connections are being re-established
    BaseUrlChanged { url: String },

    /// Health monitor loop started (active key set became non-empty)
    MonitorStarted { active_keys: usize },

    /// Health monitor loop stopped
    MonitorStopped,

    /// Supervisor worker shut down
    SupervisorStopped,
}

impl DomainEvent {
    /// Get the event type name (for logging and filtering)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ConnectionStatusChanged { .. } => "connection_status_changed",
            Self::ConnectionRemoved { .. } => "connection_removed",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::ConnectionSuspect { .. } => "connection_suspect",
            Self::StatusSnapshotPublished { .. } => "status_snapshot_published",
            Self::BaseUrlChanged { .. } => "base_url_changed",
            Self::MonitorStarted { .. } => "monitor_started",
            Self::MonitorStopped => "monitor_stopped",
            Self::SupervisorStopped => "supervisor_stopped",
        }
    }

    /// Get the connection key if this event is key-scoped
    pub fn key(&self) -> Option<&ConnectionKey> {
        match self {
            Self::ConnectionStatusChanged { key, .. }
            | Self::ConnectionRemoved { key }
            | Self::RetryScheduled { key, .. }
            | Self::ConnectionSuspect { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Status carried by a status change event
    pub fn status(&self) -> Option<ConnectionStatus> {
        match self {
            Self::ConnectionStatusChanged { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this event is high-frequency noise for audit logs
    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::StatusSnapshotPublished { .. })
    }
}

// ============================================================================
// EVENT METADATA (for audit logging)
// ============================================================================

/// Metadata wrapper for events (used by audit logger)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEventEnvelope {
    /// Unique event ID
    pub event_id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: DomainEvent,
}

impl DomainEventEnvelope {
    /// Wrap an event with metadata
    pub fn new(event: DomainEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
