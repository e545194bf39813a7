use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConnectionKey;

/// A listener as stored by the persistence layer.
///
/// Only `key` and `active` matter to the supervisor; `id` and `name`
/// travel along for logging and for collaborators that need them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerEntry {
    pub id: Uuid,
    pub key: ConnectionKey,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_active() -> bool {
    true
}

impl ListenerEntry {
    pub fn new(key: impl Into<ConnectionKey>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            active: true,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Derive the active key set from a listener collection.
///
/// Inactive listeners and blank keys are skipped; duplicate keys collapse.
pub fn active_keys(listeners: &[ListenerEntry]) -> HashSet<ConnectionKey> {
    listeners
        .iter()
        .filter(|l| l.active && !l.key.is_empty())
        .map(|l| l.key.clone())
        .collect()
}
