//! Lock coordination tunables.

use std::time::Duration;

use latchkey_common::LockError;
use serde::{Deserialize, Serialize};

/// Fixed clock drift allowance added on top of the TTL-proportional drift.
pub const FIXED_DRIFT: Duration = Duration::from_millis(2);

fn default_drift_factor() -> f64 {
    0.01
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_retry_jitter_ms() -> u64 {
    200
}

fn default_extension_threshold_ms() -> u64 {
    500
}

fn default_node_timeout_ms() -> u64 {
    100
}

fn default_auto_extend() -> bool {
    true
}

/// Configuration for the quorum lock algorithm.
///
/// Millisecond fields mirror the option names accepted in the config file
/// (`lock.retry_delay_ms` and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Fraction of the TTL reserved for clock and network skew
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,
    /// Retries after the first failed attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound of the uniform random delay added to `retry_delay_ms`
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    /// Renewal fires this long before the validity deadline
    #[serde(default = "default_extension_threshold_ms")]
    pub automatic_extension_threshold_ms: u64,
    /// Bound on every individual storage node call
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
    #[serde(default = "default_auto_extend")]
    pub auto_extend: bool,
    /// Maximum automatic renewals per handle (0 = unlimited)
    #[serde(default)]
    pub max_extensions: u32,
    /// Extra extend attempts before a renewal is declared failed
    #[serde(default)]
    pub extension_retries: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            drift_factor: default_drift_factor(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            automatic_extension_threshold_ms: default_extension_threshold_ms(),
            node_timeout_ms: default_node_timeout_ms(),
            auto_extend: default_auto_extend(),
            max_extensions: 0,
            extension_retries: 0,
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<(), LockError> {
        if !(0.0..1.0).contains(&self.drift_factor) {
            return Err(LockError::Config(format!(
                "drift_factor must be in [0, 1), got {}",
                self.drift_factor
            )));
        }
        if self.node_timeout_ms == 0 {
            return Err(LockError::Config(
                "node_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    pub fn extension_threshold(&self) -> Duration {
        Duration::from_millis(self.automatic_extension_threshold_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LockConfig::default();
        assert_eq!(config.drift_factor, 0.01);
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(200));
        assert_eq!(config.retry_jitter(), Duration::from_millis(200));
        assert_eq!(config.extension_threshold(), Duration::from_millis(500));
        assert!(config.auto_extend);
        assert_eq!(config.max_extensions, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: LockConfig =
            serde_json::from_str(r#"{"retry_count": 0, "node_timeout_ms": 50}"#).unwrap();
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.node_timeout(), Duration::from_millis(50));
        assert_eq!(config.drift_factor, 0.01);
        assert_eq!(config.retry_delay_ms, 200);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = LockConfig {
            drift_factor: 1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LockError::Config(_))));

        let config = LockConfig {
            drift_factor: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LockConfig {
            node_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
