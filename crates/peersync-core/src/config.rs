//! Sync engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default broadcast interval.
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 200;
/// Default silence before a remote object is paused.
pub const DEFAULT_PAUSE_TIMEOUT_MS: u64 = 5_000;
/// Default silence before a remote object is killed.
pub const DEFAULT_DEAD_TIMEOUT_MS: u64 = 15_000;
/// Default liveness sweep interval.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 100;

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Endpoint is required")]
    MissingEndpoint,
    #[error("Interval `{0}` must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("Timeout `{0}` must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("Pause timeout ({pause_ms} ms) must be shorter than dead timeout ({dead_ms} ms)")]
    TimeoutOrder { pause_ms: u64, dead_ms: u64 },
    #[error("Invalid config JSON: {0}")]
    Parse(String),
}

/// Sync engine configuration.
///
/// Field names serialize in camelCase, so a host can load the same
/// document it would hand to any other peer implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Relay endpoint the transport connects to.
    pub endpoint: String,
    /// Period of the object-update broadcast.
    pub broadcast_interval_ms: u64,
    /// Silence after which a remote object is paused.
    pub pause_timeout_ms: u64,
    /// Silence after which a remote object is killed.
    pub dead_timeout_ms: u64,
    /// Period of the liveness sweep.
    pub check_interval_ms: u64,
    /// Connect as soon as the engine is initialized.
    pub auto_connect: bool,
    /// Emit diagnostic logs. No behavioral effect.
    pub debug_logging: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS,
            pause_timeout_ms: DEFAULT_PAUSE_TIMEOUT_MS,
            dead_timeout_ms: DEFAULT_DEAD_TIMEOUT_MS,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            auto_connect: false,
            debug_logging: false,
        }
    }
}

impl SyncConfig {
    /// Create a config for an endpoint with default timings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the broadcast interval.
    #[must_use]
    pub const fn with_broadcast_interval_ms(mut self, ms: u64) -> Self {
        self.broadcast_interval_ms = ms;
        self
    }

    /// Set pause and dead timeouts.
    #[must_use]
    pub const fn with_timeouts_ms(mut self, pause_ms: u64, dead_ms: u64) -> Self {
        self.pause_timeout_ms = pause_ms;
        self.dead_timeout_ms = dead_ms;
        self
    }

    /// Set the liveness sweep interval.
    #[must_use]
    pub const fn with_check_interval_ms(mut self, ms: u64) -> Self {
        self.check_interval_ms = ms;
        self
    }

    /// Enable or disable connecting on init.
    #[must_use]
    pub const fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Enable or disable diagnostic logging.
    #[must_use]
    pub const fn with_debug_logging(mut self, debug_logging: bool) -> Self {
        self.debug_logging = debug_logging;
        self
    }

    /// Check the config invariants.
    ///
    /// # Errors
    /// Returns error if the endpoint is empty, an interval is zero,
    /// or the pause timeout is not shorter than the dead timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        for (name, value) in [
            ("broadcastIntervalMs", self.broadcast_interval_ms),
            ("checkIntervalMs", self.check_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        if self.pause_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("pauseTimeoutMs"));
        }
        if self.pause_timeout_ms >= self.dead_timeout_ms {
            return Err(ConfigError::TimeoutOrder {
                pause_ms: self.pause_timeout_ms,
                dead_ms: self.dead_timeout_ms,
            });
        }
        Ok(())
    }

    /// Broadcast interval as a duration.
    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    /// Liveness sweep interval as a duration.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Liveness thresholds.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        Timeouts {
            pause: Duration::from_millis(self.pause_timeout_ms),
            dead: Duration::from_millis(self.dead_timeout_ms),
        }
    }
}

/// Pause/dead thresholds used by the liveness sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Silence after which an entry is stale.
    pub pause: Duration,
    /// Silence after which an entry is removed.
    pub dead: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        SyncConfig::default().timeouts()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::new("ws://localhost:3000/ws");
        assert_eq!(config.broadcast_interval_ms, 200);
        assert_eq!(config.pause_timeout_ms, 5_000);
        assert_eq!(config.dead_timeout_ms, 15_000);
        assert_eq!(config.check_interval_ms, 100);
        assert!(!config.auto_connect);
        assert!(!config.debug_logging);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        assert_eq!(
            SyncConfig::default().validate(),
            Err(ConfigError::MissingEndpoint)
        );
    }

    #[test]
    fn test_pause_must_precede_dead() {
        let config = SyncConfig::new("memory://room").with_timeouts_ms(5_000, 5_000);
        assert_eq!(
            config.validate(),
            Err(ConfigError::TimeoutOrder {
                pause_ms: 5_000,
                dead_ms: 5_000
            })
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = SyncConfig::new("memory://room").with_check_interval_ms(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval("checkIntervalMs"))
        );
    }

    #[test]
    fn test_zero_pause_timeout_rejected() {
        let config = SyncConfig::new("memory://room").with_timeouts_ms(0, 15_000);
        let err = assert_err!(config.validate());
        assert_eq!(err, ConfigError::ZeroTimeout("pauseTimeoutMs"));
        assert_eq!(
            err.to_string(),
            "Timeout `pauseTimeoutMs` must be greater than zero"
        );
    }

    #[test]
    fn test_from_json_uses_camel_case_and_defaults() {
        let config = SyncConfig::from_json(
            r#"{"endpoint":"ws://relay/ws","pauseTimeoutMs":1000,"deadTimeoutMs":3000,"autoConnect":true}"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://relay/ws");
        assert_eq!(config.pause_timeout_ms, 1_000);
        assert_eq!(config.dead_timeout_ms, 3_000);
        assert_eq!(config.broadcast_interval_ms, 200);
        assert!(config.auto_connect);
    }

    #[test]
    fn test_from_json_validates() {
        let err = assert_err!(SyncConfig::from_json(
            r#"{"endpoint":"ws://relay/ws","deadTimeoutMs":10}"#
        ));
        assert!(matches!(err, ConfigError::TimeoutOrder { .. }));
    }
}
