//! Exponential backoff with jitter for transient send failures.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How transient failures are retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound on any delay, jitter included.
    pub max_delay: Duration,

    /// Jitter as a fraction of the delay (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            jitter_factor: 0.25,
        }
    }
}

/// What to do with a row after a transient failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the row pending until `next_attempt_at`.
    Retry {
        /// When the row becomes eligible again
        next_attempt_at: DateTime<Utc>,
    },
    /// The attempt budget is spent; the row becomes `failed`.
    GiveUp {
        /// Why retrying stopped
        reason: String,
    },
}

impl RetryPolicy {
    /// Decides the fate of a row whose `attempts` attempts (this one
    /// included) all failed transiently at `failed_at`.
    #[must_use]
    pub fn decide(&self, attempts: u32, failed_at: DateTime<Utc>) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exhausted", self.max_attempts),
            };
        }

        let Ok(delay) = chrono::Duration::from_std(self.delay_for(attempts)) else {
            return RetryDecision::GiveUp {
                reason: "retry delay out of range".to_string(),
            };
        };
        RetryDecision::Retry {
            next_attempt_at: failed_at + delay,
        }
    }

    /// Backoff after the `attempt`-th failure: `base * 2^(attempt-1)` capped
    /// at `max_delay`, then jittered and capped again.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        apply_jitter(delay, self.jitter_factor).min(self.max_delay)
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if !jitter_factor.is_finite() || jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }

    let range = duration.as_secs_f64() * jitter_factor.min(1.0);
    let offset = rand::thread_rng().gen_range(-range..=range);
    Duration::try_from_secs_f64((duration.as_secs_f64() + offset).max(0.0)).unwrap_or(duration)
}
