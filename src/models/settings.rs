//! Settings Models
//!
//! Retry policy and non-secret runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_max_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_enable_pooling() -> bool {
    true
}

fn default_max_pool_size() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

/// Retry and timeout policy for database access.
///
/// Immutable once handed to a `ResilientConnection`. Pool settings are passed
/// through to the driver; this layer never pools connections itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts per logical operation, including the first
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_enable_pooling")]
    pub enable_pooling: bool,
    #[serde(default)]
    pub min_pool_size: u32,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    /// Connection open timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub connection_timeout_secs: u64,
    /// Per-command timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: default_max_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            enable_pooling: default_enable_pooling(),
            min_pool_size: 0,
            max_pool_size: default_max_pool_size(),
            connection_timeout_secs: default_timeout_secs(),
            command_timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given attempt budget and base delay, other fields
    /// default. Delays beyond `u64::MAX` milliseconds saturate.
    pub fn new(max_retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            max_retry_count,
            retry_delay_ms: u64::try_from(retry_delay.as_millis()).unwrap_or(u64::MAX),
            ..Default::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Backoff before the retry that follows failed attempt number `attempt`
    /// (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay().saturating_mul(1u32 << exponent)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retry_count == 0 {
            return Err("maxRetryCount must be at least 1".to_string());
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(format!(
                "minPoolSize ({}) cannot exceed maxPoolSize ({})",
                self.min_pool_size, self.max_pool_size
            ));
        }
        if self.connection_timeout_secs == 0 {
            return Err("connectionTimeoutSecs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Runtime configuration stored in `deskkit.json`. Holds nothing secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Upper bound for the startup connectivity probe, in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl RuntimeConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;
        if self.probe_timeout_secs == 0 || self.probe_timeout_secs > 60 {
            return Err(format!(
                "probeTimeoutSecs must be between 1 and 60, got {}",
                self.probe_timeout_secs
            ));
        }
        Ok(())
    }
}
