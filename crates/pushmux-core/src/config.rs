//! Supervisor tunables
//!
//! Every timing constant the supervisor uses lives here so deployments can
//! trade recovery latency against battery and server load.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Fixed delay between a failure and the next scheduled attempt
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Minimum spacing between two attempts for the same key
pub const DEFAULT_CONNECT_COOLDOWN: Duration = Duration::from_secs(2);

/// A `Connecting` record older than this is considered stalled
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Health monitor reconciliation interval
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Silence after which a connected key is logged as suspect
pub const DEFAULT_SUSPECT_AFTER: Duration = Duration::from_secs(5 * 60);

/// Periodic snapshot republish cadence
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(15);

/// Pause between closing everything and reconnecting after a base URL change
pub const DEFAULT_BASE_URL_SETTLE: Duration = Duration::from_secs(1);

/// WebSocket normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    #[serde(with = "duration_millis")]
    pub connect_cooldown: Duration,
    #[serde(with = "duration_millis")]
    pub stall_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub monitor_interval: Duration,
    #[serde(with = "duration_millis")]
    pub suspect_after: Duration,
    #[serde(with = "duration_millis")]
    pub snapshot_interval: Duration,
    #[serde(with = "duration_millis")]
    pub base_url_settle: Duration,
    /// Close code used for intentional teardown
    pub close_code: u16,
    /// Capacity of the domain event broadcast channel
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_cooldown: DEFAULT_CONNECT_COOLDOWN,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            suspect_after: DEFAULT_SUSPECT_AFTER,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            base_url_settle: DEFAULT_BASE_URL_SETTLE,
            close_code: NORMAL_CLOSURE,
            event_capacity: 256,
        }
    }
}

impl SupervisorConfig {
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_connect_cooldown(mut self, cooldown: Duration) -> Self {
        self.connect_cooldown = cooldown;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_suspect_after(mut self, silence: Duration) -> Self {
        self.suspect_after = silence;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_base_url_settle(mut self, settle: Duration) -> Self {
        self.base_url_settle = settle;
        self
    }

    /// Reject values that would turn timers into busy loops.
    pub fn validate(&self) -> ConfigResult<()> {
        let non_zero = [
            ("retry_delay", self.retry_delay),
            ("monitor_interval", self.monitor_interval),
            ("snapshot_interval", self.snapshot_interval),
            ("stall_timeout", self.stall_timeout),
        ];
        for (field, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
