//! Connection identity, status, and the published status snapshot.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for one logical listener connection.
///
/// Keys are supplied by the persistence layer (usually a GUID) and are
/// stable across restarts. The supervisor never interprets them beyond
/// using them as a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConnectionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ConnectionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ConnectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Connection status - runtime state, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No physical connection and no attempt in flight
    #[default]
    Disconnected,
    /// Attempt in flight
    Connecting,
    /// Transport reported open
    Connected,
    /// Last attempt failed or the connection was found dead
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Statuses in which a transport handle may be held
    pub fn holds_handle(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Statuses the health monitor treats as retry candidates
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of connections in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub disconnected: usize,
    pub connecting: usize,
    pub connected: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.disconnected + self.connecting + self.connected + self.error
    }

    pub fn get(&self, status: ConnectionStatus) -> usize {
        match status {
            ConnectionStatus::Disconnected => self.disconnected,
            ConnectionStatus::Connecting => self.connecting,
            ConnectionStatus::Connected => self.connected,
            ConnectionStatus::Error => self.error,
        }
    }

    fn bump(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Disconnected => self.disconnected += 1,
            ConnectionStatus::Connecting => self.connecting += 1,
            ConnectionStatus::Connected => self.connected += 1,
            ConnectionStatus::Error => self.error += 1,
        }
    }
}

/// Point-in-time `key -> status` projection of the connection registry.
///
/// Observers only ever receive copies; the supervisor rebuilds the snapshot
/// from the registry whenever a record changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    entries: BTreeMap<ConnectionKey, ConnectionStatus>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ConnectionStatus> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionKey, &ConnectionStatus)> {
        self.entries.iter()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.entries.values() {
            counts.bump(*status);
        }
        counts
    }

    /// Keys currently in the given status, in key order
    pub fn keys_in(&self, status: ConnectionStatus) -> Vec<ConnectionKey> {
        self.entries
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn error_keys(&self) -> Vec<ConnectionKey> {
        self.keys_in(ConnectionStatus::Error)
    }
}

impl FromIterator<(ConnectionKey, ConnectionStatus)> for StatusSnapshot {
    fn from_iter<T: IntoIterator<Item = (ConnectionKey, ConnectionStatus)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
