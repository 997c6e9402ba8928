//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::MAX_ATTR_LEN;

/// Error returned for an invalid configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Resource limits and retry behavior of a service context. The limits mirror
/// what the stack was configured with at enable time; the registry enforces
/// them before calling into the stack.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of attribute table slots available to this service.
    pub attr_table_size: u16,
    /// Maximum characteristic value length supported by the stack.
    pub max_attr_len: u16,
    /// Number of distinct 128-bit vendor bases the stack can hold.
    pub max_vendor_uuids: u8,
    /// Number of simultaneously tracked connections.
    pub max_connections: u8,
    /// Publish retry policy for a full notification queue.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attr_table_size: 64,
            max_attr_len: 512,
            max_vendor_uuids: 4,
            max_connections: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Parses a JSON configuration. Missing fields take default values.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::Invalid;
        if self.attr_table_size == 0 {
            return Err(Invalid("attr_table_size must be non-zero"));
        }
        if self.max_attr_len == 0 || usize::from(self.max_attr_len) > MAX_ATTR_LEN {
            return Err(Invalid("max_attr_len must be between 1 and 512"));
        }
        if self.max_vendor_uuids == 0 {
            return Err(Invalid("max_vendor_uuids must be non-zero"));
        }
        if self.max_connections == 0 {
            return Err(Invalid("max_connections must be non-zero"));
        }
        if self.retry.initial_ms > self.retry.max_ms {
            return Err(Invalid("retry.initial_ms must not exceed retry.max_ms"));
        }
        Ok(())
    }
}

/// Exponential backoff policy for retrying a publish when the notification
/// queue is full.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total number of submission attempts, including the first one.
    pub attempts: u8,
    /// Delay before the first retry in milliseconds.
    pub initial_ms: u32,
    /// Upper bound of the delay in milliseconds.
    pub max_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_ms: 5,
            max_ms: 80,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before the first retry.
    #[inline]
    #[must_use]
    pub const fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms as u64)
    }

    /// Returns the maximum delay between retries.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms as u64)
    }
}
