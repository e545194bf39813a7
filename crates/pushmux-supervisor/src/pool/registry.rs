//! Connection registry
//!
//! Concurrency-safe `key -> ConnectionRecord` store. Only the supervisor
//! worker mutates records; handles read from it to answer synchronous
//! queries. DashMap guards must never be held across a call back into the
//! registry (e.g. `snapshot()`), so every accessor takes a closure and
//! releases the shard lock before returning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use pushmux_core::{ConnectionKey, ConnectionStatus, StatusSnapshot};
use serde::Serialize;
use tokio::time::Instant;

use super::scheduler::PendingRetry;
use super::transport::{AttemptId, ConnectionHandle};

/// Per-key runtime state (in-memory only)
pub struct ConnectionRecord {
    pub(crate) status: ConnectionStatus,
    /// Present only while an attempt is in flight or the connection is open
    pub(crate) handle: Option<Arc<dyn ConnectionHandle>>,
    /// Primary endpoint for this key
    pub(crate) url: Option<String>,
    /// Current attempt is the normalized fallback of `url`
    pub(crate) using_fallback: bool,
    /// Current attempt reached the open state
    pub(crate) opened: bool,
    /// Attempt whose transport events are accepted
    pub(crate) attempt: AttemptId,
    pub(crate) last_attempt_at: Instant,
    /// Consecutive failures since the last successful open
    pub(crate) attempt_count: u32,
    /// Last open or inbound message
    pub(crate) last_success_at: Option<Instant>,
    pub(crate) pending_retry: Option<PendingRetry>,
    pub(crate) last_error: Option<String>,
}

impl ConnectionRecord {
    pub(crate) fn new(attempt: AttemptId) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            handle: None,
            url: None,
            using_fallback: false,
            opened: false,
            attempt,
            last_attempt_at: Instant::now(),
            attempt_count: 0,
            last_success_at: None,
            pending_retry: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn has_pending_retry(&self) -> bool {
        self.pending_retry.is_some()
    }

    /// Take the handle out of the record and detach any in-flight events.
    ///
    /// The caller closes the returned handle once the guard is released.
    pub(crate) fn retire_handle(
        &mut self,
        next_attempt: AttemptId,
    ) -> Option<Arc<dyn ConnectionHandle>> {
        self.attempt = next_attempt;
        self.opened = false;
        self.handle.take()
    }

    fn view(&self, key: &ConnectionKey, now: Instant) -> ConnectionRecordView {
        ConnectionRecordView {
            key: key.clone(),
            status: self.status,
            url: self.url.clone(),
            using_fallback: self.using_fallback,
            attempt_count: self.attempt_count,
            retry_pending: self.pending_retry.is_some(),
            has_handle: self.handle.is_some(),
            since_last_attempt_ms: millis(now.saturating_duration_since(self.last_attempt_at)),
            since_last_success_ms: self
                .last_success_at
                .map(|at| millis(now.saturating_duration_since(at))),
            last_error: self.last_error.clone(),
        }
    }
}

fn millis(d: std::time::Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

/// Read-only copy of a record for diagnostics and UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecordView {
    pub key: ConnectionKey,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub using_fallback: bool,
    pub attempt_count: u32,
    pub retry_pending: bool,
    pub has_handle: bool,
    pub since_last_attempt_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_last_success_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Store of connection records keyed by listener
pub struct ConnectionRegistry {
    records: DashMap<ConnectionKey, ConnectionRecord>,
    next_attempt: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh attempt id
    pub fn next_attempt_id(&self) -> AttemptId {
        self.next_attempt.fetch_add(1, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn status(&self, key: &str) -> Option<ConnectionStatus> {
        self.records.get(key).map(|r| r.status)
    }

    pub fn keys(&self) -> Vec<ConnectionKey> {
        let mut keys: Vec<ConnectionKey> = self.records.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn with_record<R>(&self, key: &str, f: impl FnOnce(&ConnectionRecord) -> R) -> Option<R> {
        self.records.get(key).map(|r| f(r.value()))
    }

    pub(crate) fn with_record_mut<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut ConnectionRecord) -> R,
    ) -> Option<R> {
        self.records.get_mut(key).map(|mut r| f(r.value_mut()))
    }

    /// Mutate the record for `key`, creating a disconnected one first if absent.
    pub(crate) fn upsert<R>(
        &self,
        key: &ConnectionKey,
        f: impl FnOnce(&mut ConnectionRecord) -> R,
    ) -> R {
        let attempt = self.next_attempt_id();
        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| ConnectionRecord::new(attempt));
        f(entry.value_mut())
    }

    /// Visit every record. The closure must not call back into the registry.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&ConnectionKey, &ConnectionRecord)) {
        for entry in self.records.iter() {
            f(entry.key(), entry.value());
        }
    }

    pub(crate) fn remove(&self, key: &str) -> Option<ConnectionRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    /// Remove every record, returning them in key order
    pub(crate) fn drain(&self) -> Vec<(ConnectionKey, ConnectionRecord)> {
        let keys = self.keys();
        keys.into_iter()
            .filter_map(|k| self.records.remove(&k))
            .collect()
    }

    /// Project the registry to `key -> status`
    pub fn snapshot(&self) -> StatusSnapshot {
        self.records
            .iter()
            .map(|e| (e.key().clone(), e.value().status))
            .collect()
    }

    pub fn view(&self, key: &str) -> Option<ConnectionRecordView> {
        let now = Instant::now();
        self.records.get(key).map(|r| r.value().view(r.key(), now))
    }

    pub fn views(&self) -> Vec<ConnectionRecordView> {
        let now = Instant::now();
        let mut views: Vec<ConnectionRecordView> = self
            .records
            .iter()
            .map(|r| r.value().view(r.key(), now))
            .collect();
        views.sort_by(|a, b| a.key.cmp(&b.key));
        views
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
