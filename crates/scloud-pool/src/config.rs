use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Configuration for the connection [`Pool`](crate::Pool).
///
/// Durations are kept in milliseconds so the struct reads naturally from a
/// TOML file. All fields are optional when deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on open connections, idle plus in use.
    pub max_size: usize,
    /// Connections opened eagerly and kept idle.
    pub min_idle: usize,
    /// How long `acquire` blocks before failing with `Exhausted`.
    pub connection_timeout_ms: u64,
    /// Idle connections beyond `min_idle` are retired after this long.
    pub idle_timeout_ms: u64,
    /// Connections are retired after this age regardless of use.
    pub max_lifetime_ms: u64,
    /// A connection held longer than this is reported as a possible leak.
    /// Zero disables the check.
    pub leak_detection_threshold_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 5,
            connection_timeout_ms: 30_000,
            idle_timeout_ms: 60_000,
            max_lifetime_ms: 1_800_000,
            leak_detection_threshold_ms: 2_000,
        }
    }
}

impl PoolConfig {
    /// Check that the settings are usable together.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig("max_size must be at least 1".into()));
        }
        if self.min_idle > self.max_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_idle ({}) exceeds max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    /// `None` when leak detection is disabled.
    pub fn leak_detection_threshold(&self) -> Option<Duration> {
        (self.leak_detection_threshold_ms > 0)
            .then(|| Duration::from_millis(self.leak_detection_threshold_ms))
    }
}
