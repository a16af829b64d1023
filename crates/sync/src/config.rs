//! Sync engine configuration.
//!
//! Defaults match the documented scheduling constants; every value can be
//! overridden through `LOCALFIRST_*` environment variables.

use std::time::Duration;

use crate::error::ConfigError;
use crate::policy::RetryPolicy;

pub const ENV_TICK_MS: &str = "LOCALFIRST_TICK_MS";
pub const ENV_GATEWAY_TIMEOUT_MS: &str = "LOCALFIRST_GATEWAY_TIMEOUT_MS";
pub const ENV_BASE_DELAY_MS: &str = "LOCALFIRST_BASE_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "LOCALFIRST_MAX_DELAY_MS";
pub const ENV_MAX_RETRY: &str = "LOCALFIRST_MAX_RETRY";
pub const ENV_RETRY_SNOOZE_MS: &str = "LOCALFIRST_RETRY_SNOOZE_MS";

/// Runtime knobs of the sync engine and its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Safety-net wake-up interval of the worker loop.
    pub tick_interval: Duration,
    /// Deadline for a single gateway call; expiry counts as a failed attempt.
    pub gateway_timeout: Duration,
    /// Backoff and exhaustion policy.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(3_000),
            gateway_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Load from the process environment; unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = millis(&lookup, ENV_TICK_MS)? {
            config.tick_interval = non_zero(ENV_TICK_MS, ms)?;
        }
        if let Some(ms) = millis(&lookup, ENV_GATEWAY_TIMEOUT_MS)? {
            config.gateway_timeout = non_zero(ENV_GATEWAY_TIMEOUT_MS, ms)?;
        }
        if let Some(ms) = millis(&lookup, ENV_BASE_DELAY_MS)? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = millis(&lookup, ENV_MAX_DELAY_MS)? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = millis(&lookup, ENV_RETRY_SNOOZE_MS)? {
            config.retry.snooze = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_MAX_RETRY) {
            config.retry.max_retries = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: ENV_MAX_RETRY,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }

        if config.retry.max_delay < config.retry.base_delay {
            return Err(ConfigError::Invalid {
                key: ENV_MAX_DELAY_MS,
                value: config.retry.max_delay.as_millis().to_string(),
                reason: "must not be below the base delay".to_string(),
            });
        }

        Ok(config)
    }
}

fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: format!("{e}"),
        })
}

fn non_zero(key: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: ms.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}
