use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConnectionKey;

/// One application message received on a listener connection.
///
/// The payload is forwarded verbatim; parsing and storage belong to the
/// dispatch collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub key: ConnectionKey,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(key: ConnectionKey, payload: impl Into<String>) -> Self {
        Self {
            key,
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}
