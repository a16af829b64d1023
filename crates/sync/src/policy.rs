//! Retry/backoff policy for outbox delivery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backoff strategy between delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^retry_count
    #[default]
    Exponential,
    /// Linear backoff: base * (retry_count + 1)
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Failures after which an entry is snoozed instead of retried
    pub max_retries: u32,
    /// How far an exhausted entry is pushed out
    pub snooze: Duration,
    /// Backoff strategy
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_retries: 5,
            snooze: Duration::from_secs(24 * 60 * 60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Where a failed entry goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureSchedule {
    /// Retry count after this failure.
    pub retry_count: u32,
    /// Earliest next attempt.
    pub next_attempt_at: DateTime<Utc>,
    /// Whether the attempt budget is used up (next attempt is a snooze).
    pub exhausted: bool,
}

impl RetryPolicy {
    /// Create a policy with fixed delays.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            max_retries,
            strategy: BackoffStrategy::Fixed,
            ..Self::default()
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            strategy: BackoffStrategy::Exponential,
            ..Self::default()
        }
    }

    /// Delay after a failure, given the number of failures that preceded it.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        let max_ms = self.max_delay.as_millis();

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let factor = 1u128.checked_shl(retry_count).unwrap_or(u128::MAX);
                base_ms.saturating_mul(factor)
            }
            BackoffStrategy::Linear => base_ms.saturating_mul(u128::from(retry_count) + 1),
        }
        .min(max_ms);

        Duration::from_millis(u64::try_from(delay_ms).unwrap_or(u64::MAX))
    }

    /// Whether `retry_count` failures use up the attempt budget.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Schedule the next attempt after a failure observed at `now`.
    ///
    /// `retry_count` is the entry's count *before* this failure.
    pub fn on_failure(&self, retry_count: u32, now: DateTime<Utc>) -> FailureSchedule {
        let next_count = retry_count.saturating_add(1);
        let exhausted = self.is_exhausted(next_count);
        let wait = if exhausted {
            self.snooze
        } else {
            self.delay_for(retry_count)
        };

        FailureSchedule {
            retry_count: next_count,
            next_attempt_at: after(now, wait),
            exhausted,
        }
    }

    /// Next attempt for an exhausted entry that came due again.
    pub fn snooze_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        after(now, self.snooze)
    }
}

fn after(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
