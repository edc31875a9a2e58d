//! Retry policy for failed job attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_common::config::DispatcherConfig;

/// When a failed attempt becomes eligible again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Eligible on the next dispatch.
    #[default]
    Immediate,
    /// Exponential backoff: `base * 2^(attempts - 1)`, capped at `max_delay`.
    Exponential {
        /// Delay after the first failed attempt.
        base: Duration,
        /// Upper bound for any delay.
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// Build the policy from dispatcher configuration.
    #[must_use]
    pub fn from_config(config: &DispatcherConfig) -> Self {
        match config.retry_base_delay_secs {
            Some(base) if base > 0 => Self::Exponential {
                base: Duration::from_secs(base),
                max_delay: Duration::from_secs(config.retry_max_delay_secs),
            },
            _ => Self::Immediate,
        }
    }

    /// Delay after the given number of attempts (1-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Exponential { base, max_delay } => {
                let exponent = attempts.saturating_sub(1).min(31);
                base.checked_mul(1 << exponent)
                    .map_or(max_delay, |delay| delay.min(max_delay))
            }
        }
    }

    /// When a job that just failed its `attempts`-th attempt may run again.
    #[must_use]
    pub fn retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay_for_attempt(attempts))
            .map_or(now, |delay| now + delay)
    }
}
